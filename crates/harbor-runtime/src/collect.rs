//! Convenience consumers for a query stream.

use futures::{Stream, TryStreamExt};
use harbor_core::{HarborError, Message};

/// Drain a message stream, stopping at the first error.
pub async fn collect_messages<S>(stream: S) -> Result<Vec<Message>, HarborError>
where
    S: Stream<Item = Result<Message, HarborError>>,
{
    stream.try_collect().await
}

/// The answer of a finished run: the last non-blank `result` text, else the
/// last non-blank assistant text.
pub fn final_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter_map(Message::result_text)
        .find(|text| !text.trim().is_empty())
        .map(str::to_owned)
        .or_else(|| {
            messages
                .iter()
                .rev()
                .filter_map(Message::assistant_text)
                .find(|text| !text.trim().is_empty())
        })
}

/// Run a stream to completion and return its [`final_text`], or an empty
/// string when the run produced none.
pub async fn query_text<S>(stream: S) -> Result<String, HarborError>
where
    S: Stream<Item = Result<Message, HarborError>>,
{
    let messages = collect_messages(stream).await?;
    Ok(final_text(&messages).unwrap_or_default())
}
