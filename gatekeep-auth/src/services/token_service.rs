use rand::RngCore;
use sha2::{Digest, Sha256};

/// 32 random bytes, hex encoded. Only ever handed to the client.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// What the session store indexes instead of the raw token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
