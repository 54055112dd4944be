use crate::core::errors::ExchangeError;
use crate::core::kernel::Signer;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer: hex digest of `method + path + nonce + body`
#[derive(Debug, Clone, Copy, Default)]
pub struct OkexSigner;

impl Signer for OkexSigner {
    fn sign(
        &self,
        secret: &str,
        method: &str,
        path: &str,
        nonce: u64,
        body: &str,
    ) -> Result<String, ExchangeError> {
        let payload = format!("{}{}{}{}", method, path, nonce, body);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| ExchangeError::AuthError("Invalid secret key".to_string()))?;
        mac.update(payload.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "chNOOS4KvNXR_Xq4k4c9qsfoKWvnDecLATCRlcBwyKDYnWgO";

    #[test]
    fn test_rest_signature() {
        let signature = OkexSigner
            .sign(SECRET, "GET", "/api/v1/instrument", 1_416_993_995_705, "")
            .unwrap();
        assert_eq!(
            signature,
            "52e89f32ab615d151ae886abf585e82e23b2287b47d8d02a15527e4c82477b71"
        );
    }

    #[test]
    fn test_handshake_signature() {
        let signature = OkexSigner
            .sign(SECRET, "GET", "/realtime", 1_518_064_236, "")
            .unwrap();
        assert_eq!(
            signature,
            "6d459dc02866d35a2b965edeecc68063d488e296b77982235fc6eca24b934945"
        );
    }

    #[test]
    fn test_body_changes_signature() {
        let empty = OkexSigner.sign(SECRET, "POST", "/x", 1, "").unwrap();
        let with_body = OkexSigner.sign(SECRET, "POST", "/x", 1, "{}").unwrap();
        assert_ne!(empty, with_body);
        assert_eq!(empty.len(), 64);
    }
}
