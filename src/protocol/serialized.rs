use super::downcast;
use crate::channel::Channel;
use crate::error::Result;
use crate::product::{AnyProduct, ProductCodec, Streamer};
use crate::tag::{Instance, MessageKind};
use std::marker::PhantomData;

const KIND: MessageKind = MessageKind::SerializedProduct;

impl Channel {
    /// Stream a product into a blob and send it as one message.
    pub fn send_serialized_product<T, S>(&self, instance: Instance, product: &T, streamer: &S) -> Result<()>
    where
        S: Streamer<T> + ?Sized,
    {
        let mut blob = Vec::new();
        streamer.stream_out(product, &mut blob)?;
        self.send_raw(KIND, instance, &blob)
    }

    /// Receive a product sent with [`send_serialized_product`](Self::send_serialized_product).
    ///
    /// The message is probed first so the receive buffer has exactly the
    /// blob's size.
    pub fn receive_serialized_product<T, S>(&self, instance: Instance, streamer: &S) -> Result<T>
    where
        S: Streamer<T> + ?Sized,
    {
        let message = self.probe(KIND, instance)?;
        tracing::trace!(size = message.len(), "probed serialized product");
        let mut blob = vec![0u8; message.len()];
        self.receive_probed(message, &mut blob)?;
        streamer.stream_in(&blob)
    }
}

pub(crate) struct SerializedCodec<T, S> {
    streamer: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> SerializedCodec<T, S> {
    pub(crate) fn new(streamer: S) -> Self {
        Self {
            streamer,
            _marker: PhantomData,
        }
    }
}

impl<T, S> ProductCodec for SerializedCodec<T, S>
where
    T: Send + Sync + 'static,
    S: Streamer<T>,
{
    fn is_type(&self, product: &AnyProduct) -> bool {
        product.is::<T>()
    }

    fn send(&self, channel: &Channel, instance: Instance, product: &AnyProduct) -> Result<()> {
        channel.send_serialized_product(instance, downcast::<T>(product)?, &self.streamer)
    }

    fn receive(&self, channel: &Channel, instance: Instance) -> Result<Box<AnyProduct>> {
        Ok(Box::new(channel.receive_serialized_product::<T, S>(instance, &self.streamer)?))
    }
}
