/// What a component did with a key press.
///
/// `T` is the component's own event type (a submitted form, a picked option).
/// Views match on it and fall through to their own bindings on `NotHandled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed; nothing for the owner to do
  Handled,
  /// Consumed and produced an event
  Event(T),
  /// Not ours; try the next handler
  NotHandled,
}
