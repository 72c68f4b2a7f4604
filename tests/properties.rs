//! Property tests: random operation sequences never break the address space.

mod common;

use common::{anon_private, new_space};
use proptest::prelude::*;
use wmap::constants::{MMAPBASE, PAGESIZE};
use wmap::{MapFlags, RemapFlags, VmError};

#[derive(Clone, Debug)]
enum Op {
    Map { pages: u64 },
    MapFixed { page: u64, pages: u64 },
    Unmap { pick: usize },
    Fault { pick: usize, page: u64 },
    Remap { pick: usize, pages: u64, may_move: bool },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..8).prop_map(|pages| Op::Map { pages }),
        (0u64..64, 1u64..8).prop_map(|(page, pages)| Op::MapFixed { page, pages }),
        any::<usize>().prop_map(|pick| Op::Unmap { pick }),
        (any::<usize>(), 0u64..8).prop_map(|(pick, page)| Op::Fault { pick, page }),
        (any::<usize>(), 1u64..12, any::<bool>())
            .prop_map(|(pick, pages, may_move)| Op::Remap { pick, pages, may_move }),
    ]
}

fn overlaps(regions: &[(u64, u64)], base: u64, length: u64) -> bool {
    regions
        .iter()
        .any(|(b, l)| base < b + l && *b < base + length)
}

proptest! {
    #[test]
    fn random_sequences_keep_invariants(ops in prop::collection::vec(arb_op(), 1..60)) {
        let (mut space, frames, _files) = new_space(256);

        for op in ops {
            let before: Vec<(u64, u64)> =
                space.regions().iter().map(|r| (r.base, r.length)).collect();
            let pick = |i: usize| before.get(i % before.len().max(1)).copied();

            match op {
                Op::Map { pages } => {
                    if let Ok(base) = space.map(0, pages * PAGESIZE, anon_private(), -1) {
                        prop_assert!(!overlaps(&before, base, pages * PAGESIZE));
                    }
                }
                Op::MapFixed { page, pages } => {
                    let base = MMAPBASE + page * PAGESIZE;
                    let result =
                        space.map(base, pages * PAGESIZE, anon_private() | MapFlags::FIXED, -1);
                    if overlaps(&before, base, pages * PAGESIZE) {
                        prop_assert!(
                            matches!(result, Err(VmError::Overlap { .. })),
                            "fixed map over a region must fail with Overlap"
                        );
                    } else if before.len() < space.config().max_regions {
                        prop_assert_eq!(result.unwrap(), base);
                    }
                }
                Op::Unmap { pick: i } => {
                    if let Some((base, _)) = pick(i) {
                        space.unmap(base).unwrap();
                        prop_assert!(space.regions().find_exact(base).is_err());
                    }
                }
                Op::Fault { pick: i, page } => {
                    if let Some((base, length)) = pick(i) {
                        let addr = base + (page * PAGESIZE) % length;
                        space.handle_fault(addr).unwrap();
                    }
                }
                Op::Remap { pick: i, pages, may_move } => {
                    if let Some((base, length)) = pick(i) {
                        let flags = if may_move { RemapFlags::MAYMOVE } else { RemapFlags::empty() };
                        prop_assert!(matches!(
                            space.remap(base, length + PAGESIZE, pages * PAGESIZE, flags),
                            Err(VmError::SizeMismatch { .. })
                        ), "wrong old size must fail with SizeMismatch");
                        match space.remap(base, length, pages * PAGESIZE, flags) {
                            Ok(new_base) => {
                                let region = space.regions().find_exact(new_base).unwrap();
                                prop_assert_eq!(region.length, pages * PAGESIZE);
                                if new_base != base {
                                    prop_assert!(may_move);
                                }
                            }
                            Err(e) => {
                                prop_assert!(
                                    matches!(e, VmError::OutOfSpace(_)),
                                    "remap failed with {:?}",
                                    e
                                );
                            }
                        }
                    }
                }
            }
            prop_assert_eq!(space.check_invariants(), Ok(()));
        }

        space.release_all().unwrap();
        prop_assert_eq!(frames.free_count(), frames.frame_count());
    }
}
