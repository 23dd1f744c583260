//! Shared HTTP plumbing: send a streaming POST, map error statuses, and turn
//! the response body into an [`EventStream`].

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;

use super::adapter::{EventStream, StreamDecoder, StreamEvent};
use super::error::ProviderError;
use super::sse::SseParser;

/// Sends `request` and, on a 2xx status, streams its SSE body through `decoder`.
///
/// # Errors
///
/// Returns [`ProviderError::Network`] if the request cannot be sent, or the
/// status-mapped error from [`ProviderError::from_status`] for non-2xx replies.
pub(super) async fn post_sse<D: StreamDecoder>(
    request: reqwest::RequestBuilder,
    model: &str,
    decoder: D,
) -> Result<EventStream, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %body, "provider rejected request");
        return Err(ProviderError::from_status(
            status.as_u16(),
            body,
            retry_after,
            model,
        ));
    }
    Ok(sse_events(response.bytes_stream(), decoder))
}

struct SseState<B, D> {
    bytes: BoxStream<'static, Result<B, reqwest::Error>>,
    parser: SseParser,
    decoder: D,
    pending: VecDeque<StreamEvent>,
    error: Option<ProviderError>,
    finished: bool,
}

impl<B, D: StreamDecoder> SseState<B, D> {
    fn decode(&mut self, payload: &str) {
        match self.decoder.decode(payload) {
            Ok(events) => self.pending.extend(events),
            Err(e) => {
                self.error = Some(e);
                self.finished = true;
            }
        }
    }
}

/// Drives raw body chunks through the SSE parser and a decoder.
///
/// Events decoded before the first decode or transport error are still
/// yielded; the error then ends the stream.
pub(super) fn sse_events<S, B, D>(bytes: S, decoder: D) -> EventStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    D: StreamDecoder,
{
    let state = SseState {
        bytes: bytes.boxed(),
        parser: SseParser::default(),
        decoder,
        pending: VecDeque::new(),
        error: None,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if let Some(err) = st.error.take() {
                return Some((Err(err), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for payload in st.parser.feed(chunk.as_ref()) {
                        st.decode(&payload);
                        if st.finished {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    st.error = Some(ProviderError::Network(e));
                    st.finished = true;
                }
                None => {
                    if let Some(payload) = st.parser.finish() {
                        st.decode(&payload);
                    }
                    if !st.finished {
                        let tail = st.decoder.finish();
                        st.pending.extend(tail);
                    }
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
pub(super) mod test_support {
    use super::*;

    /// Feeds `chunks` through [`sse_events`] and collects the outcome.
    pub async fn run<D: StreamDecoder>(
        chunks: &[&str],
        decoder: D,
    ) -> Vec<Result<StreamEvent, ProviderError>> {
        let owned: Vec<Result<Vec<u8>, reqwest::Error>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        sse_events(stream::iter(owned), decoder).collect().await
    }
}
