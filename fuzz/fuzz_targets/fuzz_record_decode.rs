#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Stored records come back through bincode on restore. Malformed bytes
    // must produce an error, never a panic.
    let _ = bincode::deserialize::<verdict_consensus::Transaction>(data);
    let _ = bincode::deserialize::<verdict_queues::RecipientQueueSet>(data);
    let _ = bincode::deserialize::<verdict_fees::FeeBook>(data);
    let _ = bincode::deserialize::<verdict_types::TxHash>(data);
});
