//! Operator shell over any line-based stream

use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::controller::Controller;

const PROMPT: &[u8] = b"Enter command (enter ? for help):\n";

/// Read control commands line by line until quit or end of input
///
/// Replies are written to `writer`; unknown commands are logged and the
/// shell keeps reading.
pub async fn run_shell<R, W>(controller: Arc<Controller>, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Shell reader running");
    let mut lines = reader.lines();

    loop {
        writer.write_all(PROMPT).await?;
        writer.flush().await?;

        let Some(line) = lines.next_line().await? else {
            info!("Shell input closed");
            break;
        };

        match controller.execute_control_line(&line).await {
            Ok(outcome) => {
                if !outcome.reply.is_empty() {
                    writer.write_all(outcome.reply.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                }
                if outcome.terminate {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }

    writer.flush().await?;
    info!("Shell reader stopped");
    Ok(())
}
