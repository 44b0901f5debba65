//! Standard input as a stream of lines.

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};

/// Lines buffered between the reader task and the driver.
const INPUT_CAPACITY: usize = 64;

/// Read stdin line by line on a background task.
///
/// The channel closes at end of input.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    spawn_line_reader(BufReader::new(tokio::io::stdin()))
}

/// Read `reader` line by line on a background task.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_CAPACITY);

    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stopped reading input");
                    break;
                },
            }
        }
    });

    rx
}
