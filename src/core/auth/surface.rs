use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::session::LoginSurface;
use crate::core::error::LauncherResult;

/// Opens the sign-in page in the system browser and reads the final redirect
/// URL pasted by the user. An empty line or EOF closes the login.
pub struct ConsoleLoginSurface<R = BufReader<Stdin>> {
    input: Mutex<R>,
}

impl ConsoleLoginSurface {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleLoginSurface<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

#[async_trait]
impl<R> LoginSurface for ConsoleLoginSurface<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn open(&self, auth_url: &str) -> LauncherResult<()> {
        if let Err(e) = opener::open(auth_url) {
            warn!("Could not open a browser: {}", e);
        }
        println!("Sign in at:\n  {}\n", auth_url);
        println!("When the page turns blank, paste its full address here and press Enter:");
        info!("Waiting for login redirect");
        Ok(())
    }

    async fn wait_for_redirect(&self) -> Option<String> {
        let mut line = String::new();
        let mut input = self.input.lock().await;
        match input.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let url = line.trim();
                (!url.is_empty()).then(|| url.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pasted_lines_are_read_in_order() {
        let surface = ConsoleLoginSurface::new(BufReader::new(
            &b"https://a.example/#x=1\n  https://b.example/#x=2  \n\n"[..],
        ));

        assert_eq!(
            surface.wait_for_redirect().await.as_deref(),
            Some("https://a.example/#x=1")
        );
        assert_eq!(
            surface.wait_for_redirect().await.as_deref(),
            Some("https://b.example/#x=2")
        );
        assert_eq!(surface.wait_for_redirect().await, None);
    }

    #[tokio::test]
    async fn eof_closes_the_login() {
        let surface = ConsoleLoginSurface::new(BufReader::new(&b""[..]));
        assert_eq!(surface.wait_for_redirect().await, None);
    }
}
