//! デーモンの進捗ストリームのデコード

use crate::daemon::{ProgressMessage, StreamError};
use crate::error::DecodeError;
use futures_util::{Stream, StreamExt};

/// ストリームを読み切ってテキストログに変換
///
/// 1メッセージにつき1行。フレーム破損と通信エラーはその場で打ち切り、
/// それまでのログを返す。エラー付きメッセージは最後まで読んでから
/// 最初のエラーで失敗とする。
pub async fn decode_stream<S>(mut stream: S) -> (String, Result<(), DecodeError>)
where
    S: Stream<Item = Result<ProgressMessage, StreamError>> + Unpin,
{
    let mut output = String::new();
    let mut failure: Option<String> = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => {
                if failure.is_none()
                    && let Some(error) = &message.error
                {
                    failure = Some(error.clone());
                }
                output.push_str(&message.render());
                output.push('\n');
            }
            Err(StreamError::Malformed(reason)) => {
                tracing::debug!("Decoded output (malformed frame):\n{}", output);
                return (output, Err(DecodeError::Malformed(reason)));
            }
            Err(StreamError::Transport(err)) => {
                tracing::debug!("Decoded output (transport error):\n{}", output);
                return (output, Err(DecodeError::Transport(err)));
            }
        }
    }

    tracing::debug!("Decoded output:\n{}", output);

    match failure {
        Some(error) => (output, Err(DecodeError::OperationFailed(error))),
        None => (output, Ok(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;
    use futures_util::stream;

    fn messages(n: usize) -> Vec<Result<ProgressMessage, StreamError>> {
        (1..=n)
            .map(|i| Ok(ProgressMessage::status(format!("line {i}"))))
            .collect()
    }

    #[tokio::test]
    async fn test_all_ok_messages() {
        let (output, result) = decode_stream(stream::iter(messages(3))).await;
        assert!(result.is_ok());
        assert_eq!(output, "line 1\nline 2\nline 3\n");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let (output, result) = decode_stream(stream::iter(messages(0))).await;
        assert!(result.is_ok());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_error_message_keeps_draining() {
        let mut items = messages(5);
        items[1] = Ok(ProgressMessage::error("denied"));
        items[3] = Ok(ProgressMessage::error("second"));

        let (output, result) = decode_stream(stream::iter(items)).await;
        assert_eq!(result, Err(DecodeError::OperationFailed("denied".into())));
        assert_eq!(output.lines().count(), 5);
        assert!(output.contains("ERROR: denied\n"));
        assert!(output.ends_with("line 5\n"));
    }

    #[tokio::test]
    async fn test_malformed_frame_stops_early() {
        let mut items = messages(5);
        items[2] = Err(StreamError::Malformed("unexpected EOF".into()));

        let (output, result) = decode_stream(stream::iter(items)).await;
        assert_eq!(result, Err(DecodeError::Malformed("unexpected EOF".into())));
        assert_eq!(output, "line 1\nline 2\n");
    }

    #[tokio::test]
    async fn test_transport_error_stops_early() {
        let mut items = messages(4);
        items[0] = Err(StreamError::Transport(DaemonError::Api("reset".into())));

        let (output, result) = decode_stream(stream::iter(items)).await;
        assert!(matches!(result, Err(DecodeError::Transport(_))));
        assert!(output.is_empty());
    }
}
