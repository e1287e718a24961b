use crate::command::*;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::setup::Store;

/// Runs one command and returns the text to show the user.
///
/// Rejections the user can fix (unknown key, existing key, oversized field)
/// come back as messages. I/O and corruption errors are returned.
/// [`Command::Exit`] is left to the caller, which owns closing the store.
pub async fn execute_command(cmd: Command, storage: &mut Store) -> Result<String> {
    match run(cmd, storage).await {
        Err(Error::Duplicate) => Ok("Error: key already exists".to_string()),
        Err(Error::NotFound(_)) => Ok("Error: key not found".to_string()),
        Err(Error::InvalidArgument(reason)) => Ok(format!("Error: {}", reason)),
        other => other,
    }
}

async fn run(cmd: Command, storage: &mut Store) -> Result<String> {
    match cmd {
        Command::Get(GetCommand(key)) => match storage.find(&Entry::key_only(&key)?).await? {
            Some(entry) => Ok(entry.value().to_string()),
            None => Err(Error::NotFound("key")),
        },
        Command::Put(PutCommand(key, value)) => {
            storage.insert(Entry::new(&key, &value)?).await?;
            Ok("OK".to_string())
        }
        Command::Update(UpdateCommand(key, value)) => {
            let entry = Entry::new(&key, &value)?;
            storage.update(&Entry::key_only(&key)?, entry).await?;
            Ok("OK".to_string())
        }
        Command::Delete(DeleteCommand(key)) => {
            let removed = storage.delete(&Entry::key_only(&key)?).await?;
            Ok(format!("Deleted {}", removed.key()))
        }
        Command::List => {
            let entries = storage.to_vec().await?;
            let lines: Vec<String> = entries
                .iter()
                .map(|entry| format!("{} = {}", entry.key(), entry.value()))
                .collect();
            Ok(format!("{} entries\n{}", entries.len(), lines.join("\n"))
                .trim_end()
                .to_string())
        }
        Command::Stats => Ok(format!(
            "entries: {}, global depth: {}, buckets: {}, primary blocks: {}, overflow blocks: {}",
            storage.len(),
            storage.global_depth(),
            storage.bucket_count(),
            storage.primary_file().block_count(),
            storage.overflow_block_count(),
        )),
        Command::Exit => Ok("Goodbye!".to_string()),
    }
}
