#![cfg(not(tarpaulin_include))]

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use brewdesk::export::cell_text;
use brewdesk::token::CASHIER_ID_CLAIM;
use brewdesk::{
    ApiClient, Claims, Config, CredentialProvider, Entity, FieldFilter, FileCredentialStore,
    HttpTransport, MutationIntent, MutationOutcome, Page, Role, ScopedListView, to_csv,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::warn;
use serde_json::{Map, Value};

const PASSWORD_VAR: &str = "BREWDESK_PASSWORD";

/// Coffee-shop back office from the terminal
#[derive(Parser)]
#[command(name = "brewdesk", version)]
struct Cli {
    /// Base URL of the back-office API (overrides BREWDESK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where the session credential is kept (overrides BREWDESK_TOKEN_FILE)
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// Act as this role instead of the one carried by the credential
    #[arg(long, global = true)]
    role: Option<Role>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the issued credential
    Login {
        username: String,
        /// Password (falls back to BREWDESK_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored credential
    Logout,
    /// Show who the stored credential belongs to
    Whoami,
    /// List the pages the current role may open
    Pages,
    /// Show a page's records
    List(ListArgs),
    /// Approve a record
    Approve { page: Page, id: i64 },
    /// Reject a record
    Reject { page: Page, id: i64 },
    /// Delete a record
    Delete { page: Page, id: i64 },
    /// Change fields of a record
    Update {
        page: Page,
        id: i64,
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },
}

#[derive(Args)]
struct ListArgs {
    page: Page,

    /// Case-insensitive text to search for
    #[arg(long, short)]
    search: Option<String>,

    /// Field filter, e.g. `role=Cashier` or `branch.branchName=Downtown`
    #[arg(long = "filter", short, value_name = "FIELD=VALUE")]
    filters: Vec<String>,

    /// Print CSV instead of a table
    #[arg(long)]
    csv: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load()?;
    let api_url = cli.api_url.unwrap_or(config.api_url);
    let token_file = cli.token_file.unwrap_or(config.token_file);

    let credentials: Arc<dyn CredentialProvider> = Arc::new(FileCredentialStore::open(token_file));
    let transport = Arc::new(HttpTransport::new(api_url, config.timeout));
    let client = ApiClient::new(transport, credentials);

    match cli.command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => env::var(PASSWORD_VAR)
                    .map_err(|_| format!("no password given (use --password or {PASSWORD_VAR})"))?,
            };
            client.login(&username, &password).await?;
            println!("Signed in as {username}");
        }
        Command::Logout => {
            client.logout();
            println!("Signed out");
        }
        Command::Whoami => whoami(&client)?,
        Command::Pages => {
            let role = session_role(&client, cli.role)?;
            for page in role.pages() {
                println!("{page}");
            }
        }
        Command::List(args) => {
            let role = session_role(&client, cli.role)?;
            list(&client, role, args).await?;
        }
        Command::Approve { page, id } => {
            let role = session_role(&client, cli.role)?;
            mutate(&client, role, page, MutationIntent::approve(id)).await?;
        }
        Command::Reject { page, id } => {
            let role = session_role(&client, cli.role)?;
            mutate(&client, role, page, MutationIntent::reject(id)).await?;
        }
        Command::Delete { page, id } => {
            let role = session_role(&client, cli.role)?;
            mutate(&client, role, page, MutationIntent::delete(id)).await?;
        }
        Command::Update { page, id, set } => {
            let role = session_role(&client, cli.role)?;
            let mut payload = Map::new();
            for assignment in &set {
                let (field, value) = split_assignment(assignment)?;
                payload.insert(field.to_string(), parse_value(value));
            }
            mutate(&client, role, page, MutationIntent::update(id, payload)).await?;
        }
    }

    Ok(())
}

/// The role to act as: `--role` if given, else the credential's role claim.
fn session_role(client: &ApiClient, role: Option<Role>) -> Result<Role, Box<dyn Error>> {
    if let Some(role) = role {
        return Ok(role);
    }
    let token = client.bearer()?;
    let claims = Claims::decode(&token)?;
    let role = claims
        .role()
        .ok_or("the stored credential carries no role; pass --role")?;
    Ok(role.parse()?)
}

fn whoami(client: &ApiClient) -> Result<(), Box<dyn Error>> {
    let token = client.bearer()?;
    let claims = Claims::decode(&token)?;

    println!("User:    {}", claims.display_name().unwrap_or("(unknown)"));
    println!("Role:    {}", claims.role().unwrap_or("(none)"));
    if let Ok(cashier_id) = claims.integer(CASHIER_ID_CLAIM) {
        println!("Cashier: {cashier_id}");
    }
    if let Some(expires_at) = claims.expires_at() {
        let note = if claims.is_expired(Utc::now()) { " (expired)" } else { "" };
        println!("Expires: {}{note}", expires_at.to_rfc3339());
    }
    Ok(())
}

async fn list(client: &ApiClient, role: Role, args: ListArgs) -> Result<(), Box<dyn Error>> {
    ensure_can_open(role, args.page)?;
    let view = ScopedListView::new(client.clone(), args.page.schema(role));

    if let Some(search) = args.search {
        view.set_search(search);
    }
    for filter in &args.filters {
        let (field, value) = split_assignment(filter)?;
        if !view.schema().filter_fields.iter().any(|f| f == field) {
            warn!("{} has no `{field}` filter; applying it anyway", args.page);
        }
        view.set_filter(field, FieldFilter::parse(value));
    }

    if let Err(e) = view.load().await {
        eprintln!("Could not load {}: {e}", args.page);
        if e.requires_reauth() {
            eprintln!("Sign in again with `brewdesk login`.");
        }
        process::exit(1);
    }

    let records = view.view();
    let rows: Vec<&Entity> = records.iter().collect();
    let mut columns = vec!["id".to_string()];
    columns.extend(view.schema().columns.iter().cloned());

    if args.csv {
        print!("{}", to_csv(&rows, &columns));
    } else {
        print_table(&rows, &columns);
        println!("{} of {} records", rows.len(), view.raw().len());
    }
    Ok(())
}

async fn mutate(
    client: &ApiClient,
    role: Role,
    page: Page,
    intent: MutationIntent,
) -> Result<(), Box<dyn Error>> {
    ensure_can_open(role, page)?;
    let view = ScopedListView::new(client.clone(), page.schema(role));
    view.load().await?;

    let operation = intent.operation;
    match view.apply_mutation(intent).await {
        Ok(MutationOutcome::Updated(entity)) => {
            let status = cell_text(&entity, &view.schema().status_field);
            if status.is_empty() {
                println!("{operation}: {page} {} saved", entity.id());
            } else {
                println!("{operation}: {page} {} is now {status}", entity.id());
            }
        }
        Ok(MutationOutcome::Removed(id)) => println!("{operation}: {page} {id} removed"),
        Err(e) => {
            eprintln!("{operation} failed: {e}");
            process::exit(1);
        }
    }
    Ok(())
}

fn ensure_can_open(role: Role, page: Page) -> Result<(), Box<dyn Error>> {
    if role.can_open(page) {
        Ok(())
    } else {
        Err(format!("{role} accounts cannot open {page}").into())
    }
}

fn split_assignment(raw: &str) -> Result<(&str, &str), Box<dyn Error>> {
    raw.split_once('=')
        .map(|(field, value)| (field.trim(), value.trim()))
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| format!("expected FIELD=VALUE, got `{raw}`").into())
}

/// JSON literal when the text is one, otherwise a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_table(rows: &[&Entity], columns: &[String]) {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|entity| columns.iter().map(|c| cell_text(entity, c)).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    render_line(columns, &widths);
    for row in &cells {
        render_line(row, &widths);
    }
}

fn render_line(values: &[String], widths: &[usize]) {
    let line: Vec<String> = values
        .iter()
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect();
    println!("{}", line.join("  ").trim_end());
}
