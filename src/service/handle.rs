use std::{
    fmt::{self, Debug, Formatter},
    mem::ManuallyDrop,
};

use super::{AvPlatform, IoReturn};

/// An open session on a display's control channel.
///
/// The underlying platform token is reference counted and may be shared with
/// other parts of the system. Dropping an `AvService` releases exactly the
/// reference it holds, cloning takes a new one through the platform retain.
pub struct AvService<P: AvPlatform> {
    platform: P,
    raw: ManuallyDrop<P::Handle>,
}

impl<P: AvPlatform> AvService<P> {
    /// Take ownership of one reference on `raw`.
    pub fn from_raw(platform: P, raw: P::Handle) -> Self {
        Self {
            platform,
            raw: ManuallyDrop::new(raw),
        }
    }

    pub fn raw(&self) -> &P::Handle {
        &self.raw
    }

    /// Give up ownership without releasing, the caller becomes responsible
    /// for the reference.
    pub fn into_raw(self) -> P::Handle {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped so `raw` is taken exactly once and
        // the platform is moved out exactly once.
        unsafe {
            std::ptr::drop_in_place(&mut this.platform);
            ManuallyDrop::take(&mut this.raw)
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// shorthand for [`I2cService::read`](super::I2cService::read)
    pub fn read_i2c(&self, chip_address: u32, offset: u32, buf: &mut [u8]) -> IoReturn {
        self.platform.read_i2c(&self.raw, chip_address, offset, buf)
    }

    /// shorthand for [`I2cService::write`](super::I2cService::write)
    pub fn write_i2c(&self, chip_address: u32, data_address: u32, buf: &[u8]) -> IoReturn {
        self.platform
            .write_i2c(&self.raw, chip_address, data_address, buf)
    }
}

impl<P: AvPlatform> Clone for AvService<P> {
    fn clone(&self) -> Self {
        let raw = self.platform.retain(&self.raw);
        Self::from_raw(self.platform.clone(), raw)
    }
}

impl<P: AvPlatform> Drop for AvService<P> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and `raw` is not touched afterwards
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.platform.release(raw);
    }
}

impl<P> Debug for AvService<P>
where
    P: AvPlatform,
    P::Handle: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AvService").field(&*self.raw).finish()
    }
}

#[cfg(test)]
mod test {
    use crate::service::{
        stub::{StubCall, StubPlatform},
        AllocatorToken, AvService, I2cService,
    };

    #[test]
    fn clone_retains_and_both_release() {
        let stub = StubPlatform::new();
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();
        let alias = handle.clone();
        assert_eq!(handle.raw(), alias.raw());
        assert_eq!(stub.retains(), 1);

        drop(handle);
        assert_eq!(stub.releases(), 1);
        // the alias still holds its own reference
        assert!(alias.write_i2c(0x37, 0x51, &[0x01]).is_success());
        drop(alias);

        assert_eq!(stub.releases(), 2);
        stub.assert_balanced();
    }

    #[test]
    fn into_raw_skips_release() {
        let stub = StubPlatform::new();
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();

        let raw = handle.into_raw();
        assert_eq!(stub.releases(), 0);

        let calls = stub.calls();
        assert_eq!(calls, vec![StubCall::Create]);
        drop(AvService::from_raw(stub.clone(), raw));
        assert_eq!(stub.releases(), 1);
    }
}
