use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};

use crate::commands::router::CommandRouter;
use crate::runtime::Switch;

use super::CONSOLE_SOURCE;

/// Line reader over the operator's terminal with a bounded wait
pub struct ConsoleInputPort<R> {
    lines: Lines<R>,
    closed: bool,
}

impl ConsoleInputPort<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> ConsoleInputPort<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            closed: false,
        }
    }

    /// Wait up to `timeout` for one trimmed line. `None` on timeout.
    ///
    /// Once the input is exhausted every call sleeps for `timeout` and
    /// returns `None`, so a detached terminal cannot make the loop spin.
    pub async fn read(&mut self, timeout: Duration) -> Option<String> {
        if self.closed {
            tokio::time::sleep(timeout).await;
            return None;
        }

        // `next_line` is cancel safe, so a timed-out read loses nothing
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => None,
            Ok(Ok(Some(line))) => Some(line.trim().to_string()),
            Ok(Ok(None)) => {
                info!("Console input closed");
                self.closed = true;
                None
            }
            Ok(Err(e)) => {
                warn!("Console read failed: {}", e);
                self.closed = true;
                None
            }
        }
    }
}

/// The local control panel: reads commands and feeds them to the router as
/// the console source until its switch is turned off.
pub struct ControlPanel<R> {
    port: ConsoleInputPort<R>,
    router: Arc<CommandRouter>,
    switch: Switch,
    read_timeout: Duration,
}

impl<R: AsyncBufRead + Unpin> ControlPanel<R> {
    pub fn new(
        port: ConsoleInputPort<R>,
        router: Arc<CommandRouter>,
        switch: Switch,
        read_timeout: Duration,
    ) -> Self {
        Self {
            port,
            router,
            switch,
            read_timeout,
        }
    }

    fn print_menu(&self) {
        println!("\n\n\t\t\t\tCONTROL PANEL\n");
        println!("{}", self.router.help_lines());
    }

    pub async fn run(mut self) {
        info!("Enabled control panel");
        self.print_menu();

        while self.switch.is_on() {
            let Some(line) = self.port.read(self.read_timeout).await else {
                continue;
            };
            if line.is_empty() {
                continue;
            }

            debug!("Console command: {}", line);
            self.router.handle(&line, CONSOLE_SOURCE).await;

            if self.switch.is_on() {
                self.print_menu();
            }
        }

        info!("Control panel stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_returns_trimmed_lines_then_none_at_eof() {
        let mut port = ConsoleInputPort::new(BufReader::new(&b"  help \nlist\n"[..]));
        let timeout = Duration::from_millis(50);

        assert_eq!(port.read(timeout).await.as_deref(), Some("help"));
        assert_eq!(port.read(timeout).await.as_deref(), Some("list"));
        assert_eq!(port.read(timeout).await, None);
        // Closed input keeps yielding None
        assert_eq!(port.read(timeout).await, None);
    }

    #[tokio::test]
    async fn test_read_times_out_without_input() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut port = ConsoleInputPort::new(BufReader::new(reader));

        let started = tokio::time::Instant::now();
        assert_eq!(port.read(Duration::from_millis(30)).await, None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_timed_out_read_does_not_lose_data() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(64);
        let mut port = ConsoleInputPort::new(BufReader::new(reader));

        writer.write_all(b"rout").await.unwrap();
        assert_eq!(port.read(Duration::from_millis(20)).await, None);
        writer.write_all(b"ines\n").await.unwrap();
        assert_eq!(
            port.read(Duration::from_millis(200)).await.as_deref(),
            Some("routines")
        );
    }
}
