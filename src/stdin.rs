use crate::error::Result;
use crate::repl::execute_user_input;
use crate::setup::{setup_db, ShellConfig};

use tokio::select;
use tokio::{
    io::{stdin, AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc, oneshot},
};
use tracing::warn;

/// Runs every line piped into stdin as a command, then closes the index.
pub async fn process_from_stdin(config: ShellConfig) -> Result<()> {
    let (send, mut recv) = mpsc::channel::<String>(100);
    let (ctlrs, mut ctlrc) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctlrs.send(());
        }
    });

    tokio::spawn(async move {
        read_line_from_stdin(BufReader::new(stdin()), &send).await;
    });

    process_lines(&config, &mut recv, &mut ctlrc).await
}

async fn process_lines(
    config: &ShellConfig,
    receiver: &mut mpsc::Receiver<String>,
    ctlrc_signal: &mut oneshot::Receiver<()>,
) -> Result<()> {
    let mut storage = setup_db(config).await?;
    loop {
        select! {
            _ = &mut *ctlrc_signal => break,
            line = receiver.recv() => {
                let done = match line {
                    Some(line) => execute_user_input(&mut storage, Some(&line)).await?,
                    None => true,
                };
                if done {
                    break;
                }
            }
        }
    }
    storage.close().await
}

async fn read_line_from_stdin<R: AsyncRead + Unpin>(
    reader: BufReader<R>,
    send: &mpsc::Sender<String>,
) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if send.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "failed to read stdin");
                break;
            }
        }
    }
}
