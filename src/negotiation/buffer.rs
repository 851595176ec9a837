use crate::types::IceCandidate;

/// Locally generated candidates waiting for a transmit decision.
///
/// Drains exactly once: the first [`CandidateBuffer::drain_all`] hands out the
/// whole sequence, later drains come back empty and later adds are dropped.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    candidates: Vec<IceCandidate>,
    drained: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate. Returns false if the buffer was already drained.
    pub fn add(&mut self, candidate: IceCandidate) -> bool {
        if self.drained {
            log::warn!("Candidate buffer already drained, dropping {}", candidate.candidate);
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    pub fn drain_all(&mut self) -> Vec<IceCandidate> {
        if self.drained {
            return Vec::new();
        }
        self.drained = true;
        std::mem::take(&mut self.candidates)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn candidates(&self) -> &[IceCandidate] {
        &self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{} 1 udp 2122260223 192.168.1.{} 5000 typ host", n, n))
    }

    #[test]
    fn test_drain_preserves_order() {
        let mut buffer = CandidateBuffer::new();
        for n in 1..=3 {
            assert!(buffer.add(candidate(n)));
        }
        let drained = buffer.drain_all();
        assert_eq!(drained, vec![candidate(1), candidate(2), candidate(3)]);
    }

    #[test]
    fn test_second_drain_is_empty() {
        let mut buffer = CandidateBuffer::new();
        buffer.add(candidate(1));
        assert_eq!(buffer.drain_all().len(), 1);
        assert!(buffer.drain_all().is_empty());
        assert!(buffer.is_drained());
    }

    #[test]
    fn test_add_after_drain_is_dropped() {
        let mut buffer = CandidateBuffer::new();
        buffer.drain_all();
        assert!(!buffer.add(candidate(7)));
        assert!(buffer.is_empty());
    }
}
