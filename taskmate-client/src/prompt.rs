/// Line input for the terminal client

use std::future::Future;
use tokio::io::{AsyncBufRead, Lines};

/// Waits for the next input line
///
/// Returns `None` at end of input or once `interrupt` resolves, whichever
/// comes first. A line already buffered is dropped on interrupt.
pub async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => Ok(None),
        line = lines.next_line() => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_reads_lines_until_end_of_input() {
        let mut lines = BufReader::new(&b"/tasks\nhello\n"[..]).lines();

        let first = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(first.as_deref(), Some("/tasks"));
        let second = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(second.as_deref(), Some("hello"));
        assert_eq!(next_input(&mut lines, std::future::pending()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interrupt_ends_idle_prompt() {
        // Nothing is ever written, so reading alone would wait forever
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let line = next_input(&mut lines, std::future::ready(())).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_reads_line_from_stream() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"Add milk\n").await.unwrap();

        let line = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(line.as_deref(), Some("Add milk"));
    }
}
