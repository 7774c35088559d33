//! Shared MongoDB plumbing: connection, index setup and error mapping.

use futures::TryStreamExt;
use mongodb::bson::{doc, Document as BsonDocument};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub const DOCUMENTS: &str = "documents";
pub const VERSIONS: &str = "versions";
pub const COLLABORATORS: &str = "collaborators";
pub const COMMENTS: &str = "comments";
pub const REGISTRATIONS: &str = "registrations";

pub const ACTIVE_MEMBER_INDEX: &str = "uniq_active_member";
pub const PRIMARY_STUDENT_INDEX: &str = "uniq_primary_student";
pub const PRIMARY_ADVISOR_INDEX: &str = "uniq_primary_advisor";
pub const VERSION_NUMBER_INDEX: &str = "uniq_version_number";

const DUPLICATE_KEY: i32 = 11000;

/// Connect and return the application database.
pub async fn connect(uri: &str, database: &str) -> Result<mongodb::Database, AppError> {
    let client = mongodb::Client::with_uri_str(uri)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    Ok(client.database(database))
}

/// Create the indexes the storage-level invariants depend on.
///
/// Idempotent; safe to run on every startup.
pub async fn ensure_indexes(db: &mongodb::Database) -> Result<(), AppError> {
    for name in [DOCUMENTS, VERSIONS, COLLABORATORS, COMMENTS, REGISTRATIONS] {
        create_index(db, name, doc! { "id": 1 }, format!("uniq_{name}_id"), None).await?;
    }

    create_index(
        db,
        VERSIONS,
        doc! { "document_id": 1, "version_number": 1 },
        VERSION_NUMBER_INDEX.to_string(),
        None,
    )
    .await?;

    create_index(
        db,
        COLLABORATORS,
        doc! { "document_id": 1, "user_id": 1 },
        ACTIVE_MEMBER_INDEX.to_string(),
        Some(doc! { "active": true }),
    )
    .await?;

    // Equality-only partial filters: one index per primary role. Key order
    // differs so servers older than 5.0 accept both.
    create_index(
        db,
        COLLABORATORS,
        doc! { "document_id": 1, "role": 1 },
        PRIMARY_STUDENT_INDEX.to_string(),
        Some(doc! { "active": true, "role": "PRIMARY_STUDENT" }),
    )
    .await?;
    create_index(
        db,
        COLLABORATORS,
        doc! { "role": 1, "document_id": 1 },
        PRIMARY_ADVISOR_INDEX.to_string(),
        Some(doc! { "active": true, "role": "PRIMARY_ADVISOR" }),
    )
    .await?;

    Ok(())
}

async fn create_index(
    db: &mongodb::Database,
    collection: &str,
    keys: BsonDocument,
    name: String,
    partial: Option<BsonDocument>,
) -> Result<(), AppError> {
    let options = IndexOptions::builder()
        .unique(true)
        .name(name)
        .partial_filter_expression(partial)
        .build();
    let model = IndexModel::builder().keys(keys).options(options).build();

    db.collection::<BsonDocument>(collection)
        .create_index(model)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    Ok(())
}

/// The server message of a duplicate-key failure, if `err` is one.
///
/// The message names the violated index, which callers use to tell
/// invariant breaches from plain conflicts.
pub fn duplicate_key_message(err: &MongoError) -> Option<&str> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
            Some(e.message.as_str())
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY => Some(e.message.as_str()),
        _ => None,
    }
}

/// Map a driver error raised inside a transaction. Write conflicts between
/// concurrent transactions surface as `Conflict` so the caller sees a lost
/// race rather than a database failure.
pub fn transaction_error(err: MongoError) -> AppError {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) || duplicate_key_message(&err).is_some() {
        AppError::Conflict(format!("Concurrent modification: {}", err))
    } else {
        AppError::Database(err.to_string())
    }
}

/// Drain a cursor into a vector.
pub async fn collect<T>(mut cursor: mongodb::Cursor<T>) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned + Send + Sync + Unpin,
{
    let mut items = Vec::new();
    while let Some(item) = cursor
        .try_next()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
    {
        items.push(item);
    }
    Ok(items)
}
