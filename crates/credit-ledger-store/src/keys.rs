//! Key encoding utilities for `RocksDB`.

use credit_ledger_core::{ReservationId, TaskId, TransactionId, UserId};

/// Balance key for a user.
#[must_use]
pub fn balance_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Transaction key.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user will be sorted by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
///
/// Returns `None` if the key is shorter than 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Decode a 16-byte ULID value.
#[must_use]
pub fn decode_ulid_bytes(value: &[u8]) -> Option<[u8; 16]> {
    value.try_into().ok()
}

/// Reference index key.
#[must_use]
pub fn reference_key(reference_id: &str) -> Vec<u8> {
    reference_id.as_bytes().to_vec()
}

/// Reservation key.
#[must_use]
pub fn reservation_key(reservation_id: &ReservationId) -> Vec<u8> {
    reservation_id.to_bytes().to_vec()
}

/// Trade index key for open reservations.
#[must_use]
pub fn trade_key(trade_id: &str) -> Vec<u8> {
    trade_id.as_bytes().to_vec()
}

/// Compensation task key.
#[must_use]
pub fn task_key(task_id: &TaskId) -> Vec<u8> {
    task_id.to_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
        assert_eq!(extract_transaction_id_from_user_key(&key), Some(tx_id));
    }

    #[test]
    fn short_index_key_is_rejected() {
        assert_eq!(extract_transaction_id_from_user_key(&[0u8; 20]), None);
        assert_eq!(decode_ulid_bytes(&[1u8; 3]), None);
    }

    #[test]
    fn prefix_matches_user_keys_only() {
        let user = UserId::generate();
        let other = UserId::generate();
        let key = user_transaction_key(&other, &TransactionId::generate());
        assert!(!key.starts_with(&user_transactions_prefix(&user)));
        assert!(key.starts_with(&user_transactions_prefix(&other)));
    }
}
