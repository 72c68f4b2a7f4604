//! Address-space configuration.
//!
//! `VmConfig` bounds every placement decision of an address space: the
//! floor and ceiling of the mappable window and the two per-process
//! capacities. The defaults reproduce the classic wmap layout. A config can
//! be persisted and reloaded as CBOR.

use crate::constants::{is_page_aligned, KERNBASE, MAX_UPAGE_INFO, MAX_WMMAP_INFO, MMAPBASE};
use crate::error::{VmError, VmResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub mmap_base: u64,            // lowest address a region may start at
    pub kern_base: u64,            // exclusive upper bound of every region
    pub max_regions: usize,        // concurrent regions per process
    pub max_resident_pages: usize, // capacity of the resident-page table
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            mmap_base: MMAPBASE,
            kern_base: KERNBASE,
            max_regions: MAX_WMMAP_INFO,
            max_resident_pages: MAX_UPAGE_INFO,
        }
    }
}

impl VmConfig {
    /// Checks that the window is well formed and the capacities usable
    ///
    /// Returns:
    /// - Ok(()) if the config can back an address space
    /// - Err(VmError::InvalidConfig) naming the first violated rule
    pub fn validate(&self) -> VmResult<()> {
        if !is_page_aligned(self.mmap_base) || !is_page_aligned(self.kern_base) {
            return Err(VmError::InvalidConfig("window bounds must be page aligned"));
        }
        if self.mmap_base >= self.kern_base {
            return Err(VmError::InvalidConfig("mmap_base must lie below kern_base"));
        }
        if self.max_regions == 0 {
            return Err(VmError::InvalidConfig("max_regions cannot be zero"));
        }
        if self.max_resident_pages == 0 {
            return Err(VmError::InvalidConfig("max_resident_pages cannot be zero"));
        }
        Ok(())
    }

    /// Size of the mappable window in bytes.
    pub fn window_size(&self) -> u64 {
        self.kern_base - self.mmap_base
    }

    /// Decodes and validates a CBOR encoded config
    pub fn from_bytes(bytes: &[u8]) -> VmResult<Self> {
        let config: VmConfig = serde_cbor::from_slice(bytes)
            .map_err(|_| VmError::InvalidConfig("malformed config encoding"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // serializing a plain struct of integers cannot fail
        serde_cbor::ser::to_vec_packed(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size(), 0x2000_0000);
    }

    #[test]
    fn test_validate_rejects_bad_window() {
        let mut config = VmConfig::default();
        config.mmap_base = config.kern_base;
        assert!(matches!(config.validate(), Err(VmError::InvalidConfig(_))));

        let mut config = VmConfig::default();
        config.kern_base += 1;
        assert!(matches!(config.validate(), Err(VmError::InvalidConfig(_))));

        let mut config = VmConfig::default();
        config.max_regions = 0;
        assert!(matches!(config.validate(), Err(VmError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_survives_persistence() {
        let config = VmConfig {
            mmap_base: 0x1000_0000,
            kern_base: 0x2000_0000,
            max_regions: 4,
            max_resident_pages: 8,
        };
        let loaded = VmConfig::from_bytes(&config.to_bytes()).unwrap();
        assert_eq!(loaded, config);

        assert!(VmConfig::from_bytes(&[0xff, 0x00]).is_err());
    }
}
