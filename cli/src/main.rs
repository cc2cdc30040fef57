#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use parche::config::ClientConfig;
use parche::error::ApiError;
use parche::forms::{ForgotPasswordForm, LoginForm, RegisterForm, ResetPasswordForm};
use parche::net::types::{
    AddBookToListRequest, BookFilterParams, BookSort, CreateListRequest, CreateReviewRequest, ListVisibility,
    ReadingStatus, UpdateListRequest, UpdateProfileRequest, UpdateReviewRequest,
};
use parche::router::Route;
use parche::state::feed::FeedPager;
use parche::ParcheClient;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("session expired; log in again with `parche auth login`")]
    SessionExpired { message: String },
    #[error("{attempted} is not reachable in the current session state; landed on {landed}")]
    Redirected { attempted: String, landed: Route },
    #[error("{0}")]
    Api(ApiError),
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized { message } => Self::SessionExpired { message },
            other => Self::Api(other),
        }
    }
}

impl CliError {
    /// A 401 with no session stored beforehand is a refused sign-in (bad
    /// credentials), so the server's message is what the user needs.
    fn without_prior_session(self) -> Self {
        match self {
            Self::SessionExpired { message } => Self::Api(ApiError::Unauthorized { message }),
            other => other,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "parche", about = "Parche Lector command-line client")]
struct Cli {
    #[arg(long, env = "PARCHE_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "PARCHE_SESSION_FILE", help = "File holding the session token")]
    session_file: Option<PathBuf>,

    #[arg(long, env = "PARCHE_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    #[arg(long, env = "PARCHE_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(base_url) = &self.base_url {
            config = ClientConfig { session_file: config.session_file, ..ClientConfig::new(base_url) };
        }
        if let Some(path) = &self.session_file {
            config.session_file = Some(path.clone());
        }
        if let Some(secs) = self.request_timeout_secs.filter(|s| *s > 0) {
            config.timeouts.request_secs = secs;
        }
        if let Some(secs) = self.connect_timeout_secs.filter(|s| *s > 0) {
            config.timeouts.connect_secs = secs;
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a location through the route guard.
    Navigate { path: String },
    Auth(AuthCommand),
    Books(BooksCommand),
    Favorites(FavoritesCommand),
    Lists(ListsCommand),
    Reviews(ReviewsCommand),
    Feed(FeedArgs),
    Social(SocialCommand),
    Profile(ProfileCommand),
}

#[derive(Args, Debug)]
struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
enum AuthSubcommand {
    Login {
        username_or_email: String,
        #[arg(long, env = "PARCHE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PARCHE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    ForgotPassword {
        email: String,
    },
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
    },
    Logout,
    Status,
}

#[derive(Args, Debug)]
struct BooksCommand {
    #[command(subcommand)]
    command: BooksSubcommand,
}

#[derive(Subcommand, Debug)]
enum BooksSubcommand {
    Trending {
        #[arg(long)]
        limit: Option<u32>,
    },
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    Filter {
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        min_year: Option<i32>,
        #[arg(long)]
        max_year: Option<i32>,
        #[arg(long, help = "popular, rating, newest or oldest")]
        sort_by: Option<BookSort>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Set the reading status of a book.
    Status {
        book_id: i64,
        #[arg(help = "reading, read or want-to-read")]
        status: ReadingStatus,
    },
}

#[derive(Args, Debug)]
struct FavoritesCommand {
    #[command(subcommand)]
    command: FavoritesSubcommand,
}

#[derive(Subcommand, Debug)]
enum FavoritesSubcommand {
    List,
    Add { book_id: i64 },
    Remove { book_id: i64 },
}

#[derive(Args, Debug)]
struct ListsCommand {
    #[command(subcommand)]
    command: ListsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ListsSubcommand {
    Show {
        list_id: i64,
    },
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "public")]
        visibility: ListVisibility,
    },
    Update {
        list_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        visibility: Option<ListVisibility>,
    },
    Delete {
        list_id: i64,
    },
    AddBook {
        list_id: i64,
        book_id: i64,
        #[arg(long)]
        position: Option<i32>,
        #[arg(long)]
        note: Option<String>,
    },
    RemoveBook {
        list_id: i64,
        book_id: i64,
    },
}

#[derive(Args, Debug)]
struct ReviewsCommand {
    #[command(subcommand)]
    command: ReviewsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ReviewsSubcommand {
    Book {
        book_id: i64,
    },
    Mine {
        book_id: i64,
    },
    Create {
        book_id: i64,
        #[arg(long)]
        rating: f64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    Update {
        review_id: i64,
        #[arg(long)]
        rating: Option<f64>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    Delete {
        review_id: i64,
    },
    Like {
        review_id: i64,
    },
    Unlike {
        review_id: i64,
    },
    Liked {
        review_id: i64,
    },
    Comments {
        review_id: i64,
    },
    Comment {
        review_id: i64,
        body: String,
    },
    DeleteComment {
        review_id: i64,
        comment_id: i64,
    },
}

#[derive(Args, Debug)]
struct FeedArgs {
    #[arg(long, default_value_t = 20)]
    limit: u32,

    #[arg(long, default_value_t = 1, help = "Number of pages to fetch")]
    pages: usize,
}

#[derive(Args, Debug)]
struct SocialCommand {
    #[command(subcommand)]
    command: SocialSubcommand,
}

#[derive(Subcommand, Debug)]
enum SocialSubcommand {
    FollowUser { user_id: i64 },
    UnfollowUser { user_id: i64 },
    FollowAuthor { author_id: i64 },
    UnfollowAuthor { author_id: i64 },
    UserStatus { user_id: i64 },
    AuthorStatus { author_id: i64 },
    Stats { user_id: i64 },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Me,
    Update {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
    Activity,
    User {
        user_id: i64,
    },
    UserLists {
        user_id: i64,
    },
    UserReviews {
        user_id: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config();
    debug!(base_url = %config.base_url, "starting");
    let client = ParcheClient::from_config(&config)?;
    let had_session = client.is_authenticated();

    let result = match cli.command {
        Command::Navigate { path } => {
            let landed = client.navigate(&path);
            println!("{landed}");
            Ok(())
        }
        Command::Auth(auth) => run_auth(&client, auth).await,
        Command::Books(books) => run_books(&client, books).await,
        Command::Favorites(favorites) => run_favorites(&client, favorites).await,
        Command::Lists(lists) => run_lists(&client, lists).await,
        Command::Reviews(reviews) => run_reviews(&client, reviews).await,
        Command::Feed(args) => run_feed(&client, args).await,
        Command::Social(social) => run_social(&client, social).await,
        Command::Profile(profile) => run_profile(&client, profile).await,
    };
    if had_session { result } else { result.map_err(CliError::without_prior_session) }
}

/// Navigate to `route` and fail unless the guard let the client in.
fn enter(client: &ParcheClient, route: &Route) -> Result<(), CliError> {
    let landed = client.navigate(&route.path());
    if landed == *route {
        Ok(())
    } else {
        Err(CliError::Redirected { attempted: route.path(), landed })
    }
}

async fn run_auth(client: &ParcheClient, auth: AuthCommand) -> Result<(), CliError> {
    match auth.command {
        AuthSubcommand::Login { username_or_email, password } => {
            enter(client, &Route::Login)?;
            let form = LoginForm { username_or_email, password };
            print_json(&client.auth().login(&form).await?)
        }
        AuthSubcommand::Register { username, email, password } => {
            enter(client, &Route::Register)?;
            let form = RegisterForm { username, email, password };
            print_json(&client.auth().register(&form).await?)
        }
        AuthSubcommand::ForgotPassword { email } => {
            enter(client, &Route::ForgotPassword)?;
            client.auth().forgot_password(&ForgotPasswordForm { email }).await?;
            println!("reset link requested");
            Ok(())
        }
        AuthSubcommand::ResetPassword { token, new_password, confirm_password } => {
            enter(client, &Route::ResetPassword)?;
            let form = ResetPasswordForm { token, new_password, confirm_password };
            let landed = client.auth().reset_password(&form).await?;
            println!("{landed}");
            Ok(())
        }
        AuthSubcommand::Logout => {
            let landed = client.auth().logout();
            println!("{landed}");
            Ok(())
        }
        AuthSubcommand::Status => {
            let state = if client.is_authenticated() { "signed in" } else { "signed out" };
            println!("{state}");
            Ok(())
        }
    }
}

async fn run_books(client: &ParcheClient, books: BooksCommand) -> Result<(), CliError> {
    enter(client, &Route::Explore)?;
    let handle = client.books();
    match books.command {
        BooksSubcommand::Trending { limit } => print_json(&handle.trending(limit).await?),
        BooksSubcommand::Search { query, limit } => print_json(&handle.search(&query, limit).await?),
        BooksSubcommand::Filter { genre, min_year, max_year, sort_by, limit } => {
            let params = BookFilterParams { genre, min_year, max_year, sort_by, limit };
            print_json(&handle.filter(&params).await?)
        }
        BooksSubcommand::Status { book_id, status } => {
            handle.set_reading_status(book_id, status).await?;
            println!("{book_id}: {}", status.as_str());
            Ok(())
        }
    }
}

async fn run_favorites(client: &ParcheClient, favorites: FavoritesCommand) -> Result<(), CliError> {
    enter(client, &Route::Favorites)?;
    let handle = client.books();
    match favorites.command {
        FavoritesSubcommand::List => print_json(&handle.favorites().await?),
        FavoritesSubcommand::Add { book_id } => {
            handle.add_favorite(book_id).await?;
            print_json(&handle.favorites().await?)
        }
        FavoritesSubcommand::Remove { book_id } => {
            handle.remove_favorite(book_id).await?;
            print_json(&handle.favorites().await?)
        }
    }
}

async fn run_lists(client: &ParcheClient, lists: ListsCommand) -> Result<(), CliError> {
    let handle = client.lists();
    match lists.command {
        ListsSubcommand::Show { list_id } => {
            enter(client, &Route::ListDetail(list_id.to_string()))?;
            print_json(&handle.get(list_id).await?)
        }
        ListsSubcommand::Create { name, description, visibility } => {
            enter(client, &Route::Lists)?;
            print_json(&handle.create(&CreateListRequest { name, description, visibility }).await?)
        }
        ListsSubcommand::Update { list_id, name, description, visibility } => {
            enter(client, &Route::ListDetail(list_id.to_string()))?;
            print_json(&handle.update(list_id, &UpdateListRequest { name, description, visibility }).await?)
        }
        ListsSubcommand::Delete { list_id } => {
            enter(client, &Route::Lists)?;
            handle.delete(list_id).await?;
            println!("deleted list {list_id}");
            Ok(())
        }
        ListsSubcommand::AddBook { list_id, book_id, position, note } => {
            enter(client, &Route::ListDetail(list_id.to_string()))?;
            handle.add_book(list_id, &AddBookToListRequest { book_id, position, note }).await?;
            print_json(&handle.get(list_id).await?)
        }
        ListsSubcommand::RemoveBook { list_id, book_id } => {
            enter(client, &Route::ListDetail(list_id.to_string()))?;
            handle.remove_book(list_id, book_id).await?;
            print_json(&handle.get(list_id).await?)
        }
    }
}

async fn run_reviews(client: &ParcheClient, reviews: ReviewsCommand) -> Result<(), CliError> {
    let handle = client.reviews();
    match reviews.command {
        ReviewsSubcommand::Book { book_id } => {
            enter(client, &Route::BookDetail(book_id.to_string()))?;
            print_json(&handle.for_book(book_id).await?)
        }
        ReviewsSubcommand::Mine { book_id } => {
            enter(client, &Route::BookDetail(book_id.to_string()))?;
            print_json(&handle.mine(book_id).await?)
        }
        ReviewsSubcommand::Create { book_id, rating, title, body } => {
            enter(client, &Route::BookDetail(book_id.to_string()))?;
            print_json(&handle.create(&CreateReviewRequest { book_id, rating, title, body }).await?)
        }
        ReviewsSubcommand::Update { review_id, rating, title, body } => {
            enter(client, &Route::Profile)?;
            print_json(&handle.update(review_id, &UpdateReviewRequest { rating, title, body }).await?)
        }
        ReviewsSubcommand::Delete { review_id } => {
            enter(client, &Route::Profile)?;
            handle.delete(review_id).await?;
            println!("deleted review {review_id}");
            Ok(())
        }
        ReviewsSubcommand::Like { review_id } => {
            enter(client, &Route::Home)?;
            handle.like(review_id).await?;
            print_json(&handle.like_status(review_id).await?)
        }
        ReviewsSubcommand::Unlike { review_id } => {
            enter(client, &Route::Home)?;
            handle.unlike(review_id).await?;
            print_json(&handle.like_status(review_id).await?)
        }
        ReviewsSubcommand::Liked { review_id } => {
            enter(client, &Route::Home)?;
            print_json(&handle.like_status(review_id).await?)
        }
        ReviewsSubcommand::Comments { review_id } => {
            enter(client, &Route::Home)?;
            print_json(&handle.comments(review_id).await?)
        }
        ReviewsSubcommand::Comment { review_id, body } => {
            enter(client, &Route::Home)?;
            print_json(&handle.add_comment(review_id, &body).await?)
        }
        ReviewsSubcommand::DeleteComment { review_id, comment_id } => {
            enter(client, &Route::Home)?;
            handle.delete_comment(review_id, comment_id).await?;
            println!("deleted comment {comment_id}");
            Ok(())
        }
    }
}

async fn run_feed(client: &ParcheClient, args: FeedArgs) -> Result<(), CliError> {
    enter(client, &Route::Home)?;
    let social = client.social();
    let mut pager = FeedPager::new(args.limit);
    let mut items = Vec::new();
    for _ in 0..args.pages.max(1) {
        let Some(page) = social.next_feed_page(&mut pager).await? else {
            break;
        };
        items.extend(page.items);
    }
    print_json(&items)
}

async fn run_social(client: &ParcheClient, social: SocialCommand) -> Result<(), CliError> {
    let handle = client.social();
    match social.command {
        SocialSubcommand::FollowUser { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            print_json(&handle.follow_user(user_id).await?)
        }
        SocialSubcommand::UnfollowUser { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            handle.unfollow_user(user_id).await?;
            print_json(&handle.user_stats(user_id).await?)
        }
        SocialSubcommand::FollowAuthor { author_id } => {
            enter(client, &Route::Explore)?;
            handle.follow_author(author_id).await?;
            print_json(&handle.is_following_author(author_id).await?)
        }
        SocialSubcommand::UnfollowAuthor { author_id } => {
            enter(client, &Route::Explore)?;
            handle.unfollow_author(author_id).await?;
            print_json(&handle.is_following_author(author_id).await?)
        }
        SocialSubcommand::UserStatus { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            print_json(&handle.is_following_user(user_id).await?)
        }
        SocialSubcommand::AuthorStatus { author_id } => {
            enter(client, &Route::Explore)?;
            print_json(&handle.is_following_author(author_id).await?)
        }
        SocialSubcommand::Stats { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            print_json(&handle.user_stats(user_id).await?)
        }
    }
}

async fn run_profile(client: &ParcheClient, profile: ProfileCommand) -> Result<(), CliError> {
    let handle = client.profile();
    match profile.command {
        ProfileSubcommand::Me => {
            enter(client, &Route::Profile)?;
            print_json(&handle.me().await?)
        }
        ProfileSubcommand::Update { username, bio, avatar_url } => {
            enter(client, &Route::Profile)?;
            print_json(&handle.update(&UpdateProfileRequest { username, bio, avatar_url }).await?)
        }
        ProfileSubcommand::Activity => {
            enter(client, &Route::Profile)?;
            print_json(&handle.activity().await?)
        }
        ProfileSubcommand::User { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            print_json(&handle.user(user_id).await?)
        }
        ProfileSubcommand::UserLists { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            print_json(&handle.user_lists(user_id).await?)
        }
        ProfileSubcommand::UserReviews { user_id } => {
            enter(client, &Route::UserProfile(user_id.to_string()))?;
            print_json(&handle.user_reviews(user_id).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
