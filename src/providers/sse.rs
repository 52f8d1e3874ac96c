use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};

pub type SseEvents<E> = BoxStream<'static, Result<Event, EventStreamError<E>>>;

/// Decodes a `text/event-stream` body into events.
///
/// A trailing blank line is appended so a final event that arrives without
/// its terminator is still dispatched. Events without data are dropped.
pub fn events<S, E>(body: S) -> SseEvents<E>
where
    S: futures_util::Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    body.chain(stream::once(async { Ok(Bytes::from_static(b"\n\n")) }))
        .eventsource()
        .filter(|item| future::ready(!matches!(item, Ok(event) if event.data.is_empty())))
        .boxed()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use futures_util::stream::{self, StreamExt};

    use super::events;

    async fn collect_data(chunks: Vec<&'static [u8]>) -> Vec<String> {
        let body = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok::<_, Infallible>(Bytes::from_static(chunk))),
        );
        events(body)
            .map(|event| event.expect("event should decode").data)
            .collect()
            .await
    }

    #[tokio::test]
    async fn yields_data_payloads_in_order() {
        let payloads = collect_data(vec![&b"data: {\"a\":1}\n\ndata: [DONE]\n\n"[..]]).await;
        assert_eq!(payloads, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[tokio::test]
    async fn joins_multi_line_data_into_one_event() {
        let payloads = collect_data(vec![
            &b"data: {\"choices\":\ndata: [{\"delta\":{\"content\":\"hi\"}}]}\n\n"[..],
        ])
        .await;
        assert_eq!(
            payloads,
            vec!["{\"choices\":\n[{\"delta\":{\"content\":\"hi\"}}]}"]
        );
    }

    #[tokio::test]
    async fn buffers_partial_lines_across_chunks() {
        let payloads = collect_data(vec![&b"data: hel"[..], &b"lo\r\n\r\n"[..]]).await;
        assert_eq!(payloads, vec!["hello"]);
    }

    #[tokio::test]
    async fn keeps_multibyte_characters_split_between_chunks() {
        // "é" is 0xC3 0xA9.
        let payloads = collect_data(vec![&b"data: caf\xc3"[..], &b"\xa9\n\n"[..]]).await;
        assert_eq!(payloads, vec!["caf\u{e9}"]);
    }

    #[tokio::test]
    async fn skips_comments_and_other_fields() {
        let payloads = collect_data(vec![
            &b": keep-alive\nevent: message\nid: 7\ndata:tight\n\n\n"[..],
        ])
        .await;
        assert_eq!(payloads, vec!["tight"]);
    }

    #[tokio::test]
    async fn dispatches_final_event_without_terminator() {
        let payloads = collect_data(vec![&b"data: [DONE]"[..]]).await;
        assert_eq!(payloads, vec!["[DONE]"]);
    }
}
