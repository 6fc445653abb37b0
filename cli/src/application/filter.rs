//! Lazy model selection on a connected controller.

use futures_util::{Stream, TryStreamExt, stream};

use crate::application::ports::ControllerApi;
use crate::domain::error::SpellError;
use crate::domain::filter::{ModelInfo, ModelSelector};

enum Listing {
    Pending,
    Ready(std::vec::IntoIter<(String, ModelInfo)>),
    Done,
}

/// Streams `(label, model)` pairs chosen by `selector`.
///
/// The model listing is fetched on the first poll. The stream is finite and
/// cannot be restarted; a listing error is yielded once and ends the stream.
pub fn filter_models<'a, C: ControllerApi>(
    controller: &'a C,
    selector: &'a ModelSelector,
) -> impl Stream<Item = Result<(String, ModelInfo), SpellError>> + 'a {
    stream::unfold(Listing::Pending, move |state| async move {
        let mut selected = match state {
            Listing::Pending => {
                let listed = controller
                    .list_models()
                    .await
                    .map_err(SpellError::from_anyhow)
                    .and_then(|models| selector.select(&models));
                match listed {
                    Ok(selected) => selected.into_iter(),
                    Err(e) => return Some((Err(e), Listing::Done)),
                }
            }
            Listing::Ready(selected) => selected,
            Listing::Done => return None,
        };
        selected
            .next()
            .map(|item| (Ok(item), Listing::Ready(selected)))
    })
}

/// Collects [`filter_models`] into a vector.
///
/// # Errors
///
/// Returns the listing or pattern error.
pub async fn selected_models<C: ControllerApi>(
    controller: &C,
    selector: &ModelSelector,
) -> Result<Vec<(String, ModelInfo)>, SpellError> {
    filter_models(controller, selector).try_collect().await
}
