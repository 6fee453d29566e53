// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message and job GUIDs: 32 random bytes, lowercase hex.

use rand::RngCore;

/// Length of a GUID string in characters.
pub const GUID_LEN: usize = 64;

/// Generate a new GUID from 32 random bytes.
pub fn generate_guid() -> String {
    let mut bytes = [0u8; GUID_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// True if `guid` is exactly 64 lowercase hexadecimal characters.
pub fn is_valid_guid(guid: &str) -> bool {
    guid.len() == GUID_LEN && guid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
