use proptest::prelude::*;
use std::collections::HashSet;

use verdict_queues::RecipientQueueSet;
use verdict_types::{Address, TxHash};

fn tx(n: usize) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&(n as u64).to_le_bytes());
    TxHash::new(bytes)
}

proptest! {
    /// The head only moves forward without a reopen, and a reopen reports
    /// every relabeled id exactly once.
    #[test]
    fn head_is_monotonic_and_cascade_reports_once(
        total in 2usize..30,
        activated in 1usize..30,
        reopen_at in 0usize..30,
    ) {
        let activated = activated.min(total);
        let reopen_at = reopen_at % activated;
        let mut q = RecipientQueueSet::new(Address::new("vrd_target"));
        for i in 0..total {
            q.enqueue(tx(i)).unwrap();
        }

        let mut last_head = q.pending().head();
        for i in 0..activated {
            q.activate(&tx(i)).unwrap();
            prop_assert!(q.pending().head() > last_head);
            last_head = q.pending().head();
        }

        let relabeled = q.reopen(&tx(reopen_at)).unwrap();
        let unique: HashSet<_> = relabeled.iter().collect();
        prop_assert_eq!(unique.len(), relabeled.len());
        prop_assert_eq!(relabeled.len(), activated - reopen_at - 1);
        prop_assert!(q.is_pending_head(&tx(reopen_at)));
    }

    /// Queue sets survive a bincode round trip unchanged.
    #[test]
    fn queue_set_encodes_stably(total in 0usize..20, activated in 0usize..20) {
        let mut q = RecipientQueueSet::new(Address::new("vrd_target"));
        for i in 0..total {
            q.enqueue(tx(i)).unwrap();
        }
        for i in 0..activated.min(total) {
            q.activate(&tx(i)).unwrap();
        }
        let bytes = bincode::serialize(&q).unwrap();
        let back: RecipientQueueSet = bincode::deserialize(&bytes).unwrap();
        prop_assert_eq!(back, q);
    }
}
