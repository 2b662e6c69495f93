use crate::chunk::ContentId;
use crate::peer::PeerNode;
use std::cmp::Ordering;

/// What a caller is looking for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerQuery {
    /// Only peers known to advertise this id, when set.
    pub content_id: Option<ContentId>,
    /// Only peers whose weight is at least this, when set.
    pub min_weight: Option<f64>,
    /// At most this many peers, when set.
    pub limit: Option<usize>,
}

impl PeerQuery {
    pub fn advertising(id: impl Into<ContentId>) -> Self {
        Self {
            content_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_min_weight(mut self, weight: f64) -> Self {
        self.min_weight = Some(weight);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Finds candidate peers for a query, best candidate first.
pub trait Discovery: Send + Sync {
    fn find_peers(&self, query: &PeerQuery) -> Vec<PeerNode>;
}

/// Pluggable selection over the current peer view.
pub trait SelectionPolicy: Send + Sync {
    /// Whether `peer` answers `query` at all.
    fn accepts(&self, peer: &PeerNode, query: &PeerQuery) -> bool;

    /// Order two accepted peers; `Less` means ask `a` first.
    fn priority(&self, a: &PeerNode, b: &PeerNode) -> Ordering {
        by_weight(a, b)
    }

    fn select(&self, peers: &[PeerNode], query: &PeerQuery) -> Vec<PeerNode> {
        let mut chosen: Vec<PeerNode> = peers
            .iter()
            .filter(|p| self.accepts(p, query))
            .filter(|p| query.min_weight.map_or(true, |w| p.weight >= w))
            .cloned()
            .collect();
        chosen.sort_by(|a, b| self.priority(a, b));
        if let Some(limit) = query.limit {
            chosen.truncate(limit);
        }
        chosen
    }
}

/// Default policy: peers known to advertise the requested id, heaviest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvertisesContent;

impl SelectionPolicy for AdvertisesContent {
    fn accepts(&self, peer: &PeerNode, query: &PeerQuery) -> bool {
        match &query.content_id {
            Some(id) => peer.advertises(id),
            None => true,
        }
    }
}

/// Every known peer, heaviest first, regardless of what it advertises.
///
/// Useful when advertisement views are known to be stale.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyPeer;

impl SelectionPolicy for AnyPeer {
    fn accepts(&self, _peer: &PeerNode, _query: &PeerQuery) -> bool {
        true
    }
}

/// Descending weight, ties broken by id so the order is stable.
/// `total_cmp` keeps this a total order even when a weight is NaN.
fn by_weight(a: &PeerNode, b: &PeerNode) -> Ordering {
    b.weight
        .total_cmp(&a.weight)
        .then_with(|| a.id.cmp(&b.id))
}
