//! Completion-callback adapter for call sites that expect a
//! `(succeeded, error)` pair instead of a `Result`.

use std::future::Future;

use crate::error::{Error, Result};

/// Awaits `operation` and reports its outcome to `completion` exactly once.
///
/// `completion` runs on the task that awaits this future.
///
/// ```no_run
/// # async fn demo(client: &mut sidewire::ServerConnection<sidewire::StreamConnection<tokio::net::TcpStream>>) {
/// sidewire::compat::with_callback(client.enable_unsigned_execution("ABCD"), |ok, err| {
///     if !ok {
///         eprintln!("failed: {err:?}");
///     }
/// })
/// .await;
/// # }
/// ```
pub async fn with_callback<T>(
    operation: impl Future<Output = Result<T>>,
    completion: impl FnOnce(bool, Option<Error>),
) {
    match operation.await {
        Ok(_) => completion(true, None),
        Err(e) => completion(false, Some(e)),
    }
}

#[cfg(test)]
mod tests {
    use sidewire_proto::PeerError;

    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn success_reports_true_without_error() {
        let mut calls = Vec::new();
        with_callback(async { Ok(()) }, |ok, err| calls.push((ok, err.is_none()))).await;
        assert_eq!(calls, [(true, true)]);
    }

    #[tokio::test]
    async fn failure_reports_error_once() {
        let mut calls = Vec::new();
        with_callback(
            async { Err::<(), _>(Error::from(PeerError::new(7, None))) },
            |ok, err| calls.push((ok, err.map(|e| e.kind()))),
        )
        .await;
        assert_eq!(calls, [(false, Some(ErrorKind::ApplicationError))]);
    }
}
