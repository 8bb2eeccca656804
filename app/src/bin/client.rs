//! nexus-client: exercises the demo server.

use clap::{Parser, Subcommand};
use futures::StreamExt;
use nexus_app::rpc::{Deleted, Greeting, User, WhoAmI};
use nexus_rpc::client::{Client, ClientConfig};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Parser)]
#[command(name = "nexus-client")]
#[command(about = "Demo client for the nexus-rpc server", long_about = None)]
struct Cli {
    /// Base URL of the RPC endpoints
    #[arg(short, long, env = "NEXUS_URL", default_value = "http://127.0.0.1:3000/api/rpc")]
    url: String,

    /// Bearer token sent with every request
    #[arg(short, long, env = "NEXUS_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call `hello`
    Hello {
        #[arg(default_value = "world")]
        text: String,
    },
    /// Call `whoami`
    Whoami,
    /// Call the `user` procedures
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Issue several calls at once; they travel as one batch
    Batch {
        /// User ids to look up alongside `hello`
        #[arg(default_values_t = vec!["1".to_string(), "2".to_string(), "999".to_string()])]
        ids: Vec<String>,
    },
    /// Subscribe to `teststream` and print every message
    Stream {
        #[arg(default_value = "world")]
        text: String,
        /// Resume after this event id
        #[arg(long)]
        last_event_id: Option<String>,
    },
    /// List the server's procedures
    Procedures,
}

#[derive(Subcommand)]
enum UserCommands {
    /// `user.getById`
    Get { id: String },
    /// `user.list`
    List,
    /// `user.create`
    Create { name: String, email: String },
    /// `user.delete`
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ClientConfig::new();
    if let Some(token) = &cli.token {
        config = config.with_bearer_token(token);
    }
    let client = Client::with_config(&cli.url, config)?;

    match cli.command {
        Commands::Hello { text } => {
            let greeting: Greeting = client.query("hello", json!({ "text": text })).await?;
            print_json(&greeting)?;
        }
        Commands::Whoami => {
            let me: WhoAmI = client.query("whoami", Value::Null).await?;
            print_json(&me)?;
        }
        Commands::User { command } => {
            let users = client.scope("user");
            match command {
                UserCommands::Get { id } => {
                    let user: User = users.query("getById", json!({ "id": id })).await?;
                    print_json(&user)?;
                }
                UserCommands::List => {
                    let list: Vec<User> = users.query("list", Value::Null).await?;
                    print_json(&list)?;
                }
                UserCommands::Create { name, email } => {
                    let user: User = users
                        .mutation("create", json!({ "name": name, "email": email }))
                        .await?;
                    print_json(&user)?;
                }
                UserCommands::Delete { id } => {
                    let deleted: Deleted = users.mutation("delete", json!({ "id": id })).await?;
                    print_json(&deleted)?;
                }
            }
        }
        Commands::Batch { ids } => {
            let users = client.scope("user");
            let lookups = ids
                .iter()
                .map(|id| users.query::<_, User>("getById", json!({ "id": id })));
            let (greeting, results) = tokio::join!(
                client.query::<_, Greeting>("hello", json!({ "text": "batch" })),
                futures::future::join_all(lookups),
            );

            match greeting {
                Ok(greeting) => println!("hello            → {}", greeting.greeting),
                Err(error) => println!("hello            ✗ {}", error),
            }
            for (id, result) in ids.iter().zip(results) {
                match result {
                    Ok(user) => println!("user.getById {:<4}→ {} <{}>", id, user.name, user.email),
                    Err(error) => println!("user.getById {:<4}✗ {}", id, error),
                }
            }
        }
        Commands::Stream {
            text,
            last_event_id,
        } => {
            let input = json!({ "text": text });
            let mut stream = match last_event_id {
                Some(last) => client.subscribe_from::<_, String>("teststream", input, last).await?,
                None => client.subscribe::<_, String>("teststream", input).await?,
            };
            println!("subscribed as {}", stream.id());
            while let Some(message) = stream.next().await {
                let message = message?;
                println!("[{}] {}", stream.last_event_id().unwrap_or("-"), message);
            }
            println!("stream completed");
        }
        Commands::Procedures => {
            for procedure in client.procedures().await? {
                println!("{:<14} {}", procedure.procedure_type.to_string(), procedure.path);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
