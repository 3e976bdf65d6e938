//! notification-store - operator CLI for the notification read-model

use clap::Parser;
use tracing::{error, info, warn};

use notification_store::{
    config::{Args, Command},
    db::{schemas::NotificationDoc, MemoryExecutor, MongoClient, PipelineExecutor},
    logging,
    repository::parse_notification_id,
    views::NotificationView,
    MarkRequest, NotificationRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    info!(
        "Collections: {} / {}",
        args.notification_collection, args.publish_collection
    );

    if args.dev_mode {
        warn!("Dev mode: using an empty in-memory store, MongoDB is not contacted");
        if matches!(args.command, Command::EnsureIndexes) {
            warn!("Nothing to index in dev mode");
            return Ok(());
        }
        let repo =
            NotificationRepository::with_collections(MemoryExecutor::new(), args.collections());
        return run(&repo, args.command).await;
    }

    let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;

    if matches!(args.command, Command::EnsureIndexes) {
        let applied = mongo
            .ensure_indexes::<NotificationDoc>(&args.notification_collection)
            .await?;
        println!("{}", serde_json::json!({ "indexesApplied": applied }));
        return Ok(());
    }

    let repo = NotificationRepository::with_collections(mongo, args.collections());
    run(&repo, args.command).await
}

async fn run<E: PipelineExecutor>(
    repo: &NotificationRepository<E>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Get { tenant, id } => {
            let id = parse_notification_id(&id)?;
            let found = repo.find_notification_with_data(&tenant, id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&NotificationView::from(&found))?
            );
        }
        Command::List {
            tenant,
            user,
            methods,
            filters,
            page_size,
            page,
        } => {
            let filters = (!filters.is_empty()).then_some(filters.as_slice());
            let result = repo
                .get_paged_notifications(&tenant, &user, &methods, filters, page_size, page)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Mark {
            tenant,
            user,
            read_ids,
            unread_ids,
        } => {
            let request = MarkRequest {
                mark_read_ids: read_ids,
                unmark_read_ids: unread_ids,
            };
            let modified = repo.mark_notifications(&tenant, &user, &request).await?;
            println!("{}", serde_json::json!({ "modified": modified }));
        }
        Command::EnsureIndexes => {
            warn!("ensure-indexes requires a MongoDB connection");
        }
    }

    Ok(())
}
