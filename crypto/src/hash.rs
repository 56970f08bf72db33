//! Blake2b hashing.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use verdict_types::{Address, TxHash};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Content hash identifying a submission.
///
/// Variable-length fields are length-prefixed so distinct
/// `(sender, recipient)` splits can never collide.
pub fn transaction_id(sender: &Address, recipient: &Address, nonce: u64, payload: &[u8]) -> TxHash {
    let sender_len = (sender.as_bytes().len() as u64).to_le_bytes();
    let recipient_len = (recipient.as_bytes().len() as u64).to_le_bytes();
    TxHash::new(blake2b_256_multi(&[
        b"verdict-tx",
        &sender_len,
        sender.as_bytes(),
        &recipient_len,
        recipient.as_bytes(),
        &nonce.to_le_bytes(),
        payload,
    ]))
}
