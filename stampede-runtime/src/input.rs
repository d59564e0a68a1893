use crate::{error::RuntimeError, traits::Control};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
#[allow(unused)]
use tracing::{debug, error, info, warn};

pub(crate) async fn stdin_task(control: Arc<dyn Control>) -> Result<(), RuntimeError> {
    read_commands(BufReader::new(tokio::io::stdin()), control).await
}

/// Line-oriented operator commands. `stop` is the only one.
pub(crate) async fn read_commands<R>(reader: R, control: Arc<dyn Control>) -> Result<(), RuntimeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            command if command.eq_ignore_ascii_case("stop") => {
                info!("Stop requested from standard input");
                if let Err(err) = control.stop_execution() {
                    error!("Unable to stop execution: {err}");
                }
            }
            other => warn!("Unknown command \"{other}\"; expected \"stop\""),
        }
    }

    debug!("Standard input closed");
    Ok(())
}
