//! Pure forwarding-direction function.
//!
//! Given `(root, cur)` within a group of known size, returns the next
//! hop toward `root`. Every engine consults this whenever it needs to
//! decide whether to forward and where.

use crate::value::Rank;

/// Topology tag carried in `GlobalNamespace` and resolved locally on
/// every rank, never sent as anything but the tag itself, so ranks
/// must agree on `group_size` out of band (at namespace create/attach
/// time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Topology {
    /// k-nomial tree, `arity` children per internal node.
    KNomial { arity: u32 },
}

impl Topology {
    /// Binomial tree (k-nomial with arity 2). The common case and the
    /// default used by `Registry::create` when the caller doesn't care.
    pub const fn binomial() -> Self {
        Topology::KNomial { arity: 2 }
    }

    /// Returns `parent(cur)` such that repeated application converges
    /// to `root` in finite steps. Returns `root` itself when
    /// `cur == root`.
    ///
    /// Ranks are relabeled relative to `root` (`rel = (cur - root) mod
    /// group_size`) so the root always sits at relative position 0;
    /// the k-nomial parent of a relative position is found by
    /// stripping its lowest non-zero base-`arity` digit.
    pub fn parent(&self, root: Rank, cur: Rank, group_size: u32) -> Rank {
        if cur == root || group_size <= 1 {
            return root;
        }

        let Topology::KNomial { arity } = *self;
        let arity = arity.max(2);

        let rel = (cur + group_size - root) % group_size;
        debug_assert_ne!(rel, 0);

        // Find the lowest non-zero digit in base `arity` and clear it;
        // that's the relative rank of the parent in a k-nomial tree.
        let mut digit_base = 1u64;
        let mut rel64 = rel as u64;
        loop {
            let digit = rel64 % arity as u64;
            if digit != 0 {
                break;
            }
            rel64 /= arity as u64;
            digit_base *= arity as u64;
        }
        let parent_rel = rel as u64 - digit_base;

        ((parent_rel as u32) + root) % group_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_maps_to_itself() {
        let topo = Topology::binomial();
        assert_eq!(topo.parent(0, 0, 8), 0);
        assert_eq!(topo.parent(3, 3, 8), 3);
    }

    #[test]
    fn binomial_converges_to_root() {
        let topo = Topology::binomial();
        let root = 0;
        let group_size = 16;
        for cur in 1..group_size {
            let mut hop = cur;
            let mut steps = 0;
            while hop != root {
                hop = topo.parent(root, hop, group_size);
                steps += 1;
                assert!(steps <= group_size, "failed to converge for cur={cur}");
            }
        }
    }

    #[test]
    fn arbitrary_root_converges() {
        let topo = Topology::KNomial { arity: 3 };
        let root = 5;
        let group_size = 12;
        for cur in 0..group_size {
            let mut hop = cur;
            let mut steps = 0;
            while hop != root {
                hop = topo.parent(root, hop, group_size);
                steps += 1;
                assert!(steps <= group_size, "failed to converge for cur={cur}");
            }
        }
    }
}
