use crate::command::Command;
use crate::error::Result;
use crate::execute::execute_command;
use crate::setup::{setup_db, ShellConfig, Store};
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::oneshot::{channel, Receiver};
use tracing::warn;

pub async fn run_repl(config: ShellConfig) -> Result<()> {
    let mut storage = setup_db(&config).await?;

    // A task waits for ctrl-c and signals the prompt loop, which selects
    // between the signal and the next line.
    let (sender, mut receiver) = channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = sender.send(());
        }
    });

    println!("Welcome to Rusty Ext Hash! ({})", config.dir.display());
    let mut reader = BufReader::new(stdin()).lines();
    loop {
        if inner_loop(&mut storage, &mut reader, &mut receiver).await? {
            break;
        }
    }
    storage.close().await?;
    println!("Goodbye!");
    Ok(())
}

/// Runs one line of input. Returns whether the session should end.
pub(crate) async fn execute_user_input(storage: &mut Store, input: Option<&str>) -> Result<bool> {
    let Some(input) = input else {
        return Ok(true);
    };
    if input.trim().is_empty() {
        return Ok(false);
    }

    match input.parse::<Command>() {
        Err(err) => {
            println!("Error: {}", err);
            Ok(false)
        }
        Ok(Command::Exit) => Ok(true),
        Ok(cmd) => {
            println!("{}", execute_command(cmd, storage).await?);
            Ok(false)
        }
    }
}

async fn inner_loop(
    storage: &mut Store,
    reader: &mut Lines<BufReader<Stdin>>,
    receiver: &mut Receiver<()>,
) -> Result<bool> {
    select! {
        _ = receiver => {
            println!("Received ctrl-c");
            Ok(true)
        }
        input = reader.next_line() => {
            let input = input.unwrap_or_else(|err| {
                warn!(%err, "failed to read stdin");
                None
            });
            execute_user_input(storage, input.as_deref()).await
        }
    }
}
