use std::pin::Pin;

/// A boxed async stream, used for the observable turn-execution variant.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;
