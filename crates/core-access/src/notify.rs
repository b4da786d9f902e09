use crate::AccountError;
use async_trait::async_trait;
use axiant::User;
use std::fmt::Debug;
use tracing::{debug, info};

/// Delivers one-time codes to users.
#[async_trait]
pub trait OtpNotifier: Send + Sync + Debug {
    /// Sends the signup verification code.
    async fn send_verification(&self, user: &User, code: &str) -> Result<(), AccountError>;

    /// Sends the password-reset code.
    async fn send_password_reset(&self, user: &User, code: &str) -> Result<(), AccountError>;
}

/// Writes codes to the log instead of sending them.
///
/// Only the issue event is logged at `info`. The code itself is logged at `debug`, so it
/// stays out of logs under the default filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn send_verification(&self, user: &User, code: &str) -> Result<(), AccountError> {
        info!(email = %user.email, "Verification code issued.");
        debug!(email = %user.email, code = %code, "Verification code.");
        Ok(())
    }

    async fn send_password_reset(&self, user: &User, code: &str) -> Result<(), AccountError> {
        info!(email = %user.email, "Password reset code issued.");
        debug!(email = %user.email, code = %code, "Password reset code.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axiant_test_utils::sample_user;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn codes_stay_out_of_info_logs() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(captured.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let user = sample_user("u1", "ada@example.com");

        LogNotifier.send_verification(&user, "482913").await.unwrap();
        LogNotifier.send_password_reset(&user, "175064").await.unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Verification code issued."), "{output}");
        assert!(!output.contains("482913"), "{output}");
        assert!(!output.contains("175064"), "{output}");
    }
}
