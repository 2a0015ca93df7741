use super::downcast;
use crate::channel::Channel;
use crate::error::Result;
use crate::product::{AnyProduct, ProductCodec, TrivialCopy};
use crate::tag::{Instance, MessageKind};
use std::marker::PhantomData;

const KIND: MessageKind = MessageKind::TrivialCopyProduct;

impl Channel {
    /// Send a product as its parameter message (if any) followed by its regions.
    ///
    /// The caller must make sure nothing is still writing to the regions.
    pub fn send_trivial_copy_product<T: TrivialCopy>(&self, instance: Instance, product: &T) -> Result<()> {
        if T::REQUIRES_PARAMETERS {
            let parameters = product.parameters();
            tracing::trace!(size = parameters.len(), "sending trivial copy parameters");
            self.send_raw(KIND, instance, &parameters)?;
        }

        // No region count is sent; the receiver's type knows it.
        for (index, region) in product.regions().iter().enumerate() {
            tracing::trace!(region = index, size = region.len(), "sending region");
            self.send_raw(KIND, instance, region)?;
        }
        Ok(())
    }

    /// Receive a product sent with [`send_trivial_copy_product`](Self::send_trivial_copy_product).
    pub fn receive_trivial_copy_product<T: TrivialCopy>(&self, instance: Instance) -> Result<T> {
        let mut product = if T::REQUIRES_PARAMETERS {
            let message = self.probe(KIND, instance)?;
            let mut parameters = vec![0u8; message.len()];
            self.receive_probed(message, &mut parameters)?;
            T::allocate(Some(&parameters))?
        } else {
            T::allocate(None)?
        };

        for (index, region) in product.regions_mut().into_iter().enumerate() {
            let status = self.receive_raw(KIND, instance, region)?;
            tracing::trace!(region = index, size = status.len, "received region");
        }
        product.finalize()?;
        Ok(product)
    }
}

pub(crate) struct TrivialCopyCodec<T>(PhantomData<fn() -> T>);

impl<T> TrivialCopyCodec<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: TrivialCopy> ProductCodec for TrivialCopyCodec<T> {
    fn is_type(&self, product: &AnyProduct) -> bool {
        product.is::<T>()
    }

    fn send(&self, channel: &Channel, instance: Instance, product: &AnyProduct) -> Result<()> {
        channel.send_trivial_copy_product(instance, downcast::<T>(product)?)
    }

    fn receive(&self, channel: &Channel, instance: Instance) -> Result<Box<AnyProduct>> {
        Ok(Box::new(channel.receive_trivial_copy_product::<T>(instance)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::product::ProductType;
    use smallvec::{SmallVec, smallvec};

    const INSTANCE: Instance = Instance::from_raw(3);

    /// Two regions of 100 and 4 bytes, shaped by a parameter message.
    #[derive(Debug, PartialEq)]
    struct Split {
        body: Vec<u8>,
        trailer: [u8; 4],
    }

    impl TrivialCopy for Split {
        const REQUIRES_PARAMETERS: bool = true;

        fn parameters(&self) -> Vec<u8> {
            (self.body.len() as u32).to_le_bytes().to_vec()
        }

        fn regions(&self) -> SmallVec<[&[u8]; 2]> {
            smallvec![self.body.as_slice(), self.trailer.as_slice()]
        }

        fn allocate(parameters: Option<&[u8]>) -> Result<Self> {
            let raw: [u8; 4] = parameters
                .and_then(|p| p.try_into().ok())
                .ok_or_else(|| Error::Protocol("bad parameters".into()))?;
            Ok(Split {
                body: vec![0; u32::from_le_bytes(raw) as usize],
                trailer: [0; 4],
            })
        }

        fn regions_mut(&mut self) -> SmallVec<[&mut [u8]; 2]> {
            smallvec![self.body.as_mut_slice(), self.trailer.as_mut_slice()]
        }
    }

    #[test]
    fn test_parameters_and_two_regions() {
        let (a, b) = Channel::local_pair();
        let original = Split {
            body: (0..100).collect(),
            trailer: [0xde, 0xad, 0xbe, 0xef],
        };

        a.send_trivial_copy_product(INSTANCE, &original).unwrap();
        let received: Split = b.receive_trivial_copy_product(INSTANCE).unwrap();

        assert_eq!(received.body.len(), 100);
        assert_eq!(received, original);
    }

    #[test]
    fn test_flat_array_without_parameters() {
        let (a, b) = Channel::local_pair();
        let original = [0x5au8; 64];

        a.send_trivial_copy_product(INSTANCE, &original).unwrap();
        let received: [u8; 64] = b.receive_trivial_copy_product(INSTANCE).unwrap();
        assert_eq!(received, original);
    }

    #[test]
    fn test_oversized_region_is_truncation() {
        let (a, b) = Channel::local_pair();
        // Sender uses a larger flat type than the receiver expects.
        a.send_trivial_copy_product(INSTANCE, &[1u8; 8]).unwrap();
        let err = b.receive_trivial_copy_product::<[u8; 4]>(INSTANCE).unwrap_err();
        assert!(matches!(err, Error::Truncated { expected: 4, actual: 8, .. }));
    }

    #[test]
    fn test_through_descriptor() {
        let (a, b) = Channel::local_pair();
        let ty = ProductType::trivial_copy::<Vec<u8>>();
        let payload = vec![1u8, 2, 3, 4, 5];

        ty.send(&a, INSTANCE, &payload).unwrap();
        let received = ty.receive(&b, INSTANCE).unwrap();
        assert_eq!(received.downcast_ref::<Vec<u8>>(), Some(&payload));

        let err = ty.send(&a, INSTANCE, &42u32).unwrap_err();
        assert!(matches!(err, Error::ProductType { .. }));
    }
}
