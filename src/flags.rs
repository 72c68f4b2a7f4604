//! Typed views of the `wmap` / `wremap` flag words

use crate::constants::{MAP_ANONYMOUS, MAP_FIXED, MAP_PRIVATE, MAP_SHARED, MREMAP_MAYMOVE};
use crate::error::{VmError, VmResult};
use crate::region::Sharing;
use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        const PRIVATE = MAP_PRIVATE;
        const SHARED = MAP_SHARED;
        const ANONYMOUS = MAP_ANONYMOUS;
        const FIXED = MAP_FIXED;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RemapFlags: u32 {
        const MAYMOVE = MREMAP_MAYMOVE;
    }
}

impl MapFlags {
    /// Decodes a raw flag word, rejecting unknown bits
    pub fn from_raw(raw: u32) -> VmResult<Self> {
        MapFlags::from_bits(raw).ok_or(VmError::InvalidArgument("unknown wmap flag bits"))
    }

    /// Returns Err(VmError::InvalidArgument) unless exactly one of PRIVATE and
    /// SHARED is set
    pub fn sharing(&self) -> VmResult<Sharing> {
        match (self.contains(MapFlags::PRIVATE), self.contains(MapFlags::SHARED)) {
            (true, false) => Ok(Sharing::Private),
            (false, true) => Ok(Sharing::Shared),
            _ => Err(VmError::InvalidArgument("exactly one of MAP_PRIVATE and MAP_SHARED is required")),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.contains(MapFlags::FIXED)
    }

    pub fn is_anonymous(&self) -> bool {
        self.contains(MapFlags::ANONYMOUS)
    }
}

impl RemapFlags {
    pub fn from_raw(raw: u32) -> VmResult<Self> {
        RemapFlags::from_bits(raw).ok_or(VmError::InvalidArgument("unknown wremap flag bits"))
    }

    pub fn may_move(&self) -> bool {
        self.contains(RemapFlags::MAYMOVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharing_needs_exactly_one_mode() {
        assert_eq!(MapFlags::PRIVATE.sharing().unwrap(), Sharing::Private);
        assert_eq!(
            (MapFlags::SHARED | MapFlags::ANONYMOUS).sharing().unwrap(),
            Sharing::Shared
        );
        assert!(MapFlags::ANONYMOUS.sharing().is_err());
        assert!((MapFlags::PRIVATE | MapFlags::SHARED).sharing().is_err());
    }

    #[test]
    fn test_from_raw_rejects_unknown_bits() {
        let flags = MapFlags::from_raw(MAP_FIXED | MAP_SHARED).unwrap();
        assert!(flags.is_fixed());
        assert!(!flags.is_anonymous());
        assert!(MapFlags::from_raw(0x100).is_err());

        assert!(RemapFlags::from_raw(0).is_ok());
        assert!(RemapFlags::from_raw(MREMAP_MAYMOVE).unwrap().may_move());
        assert!(RemapFlags::from_raw(2).is_err());
    }
}
