use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Bytes of OS randomness behind every code verifier
const VERIFIER_ENTROPY_BYTES: usize = 32;

/// A code verifier and the S256 challenge derived from it
///
/// Generated once per handler and reused for every authorization attempt
/// that handler makes.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVariables {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkceVariables {
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = S256PkceGenerator.generate_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

impl std::fmt::Debug for PkceVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVariables")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// Source of PKCE verifier/challenge pairs
pub trait PkceGenerator: Send + Sync {
    fn generate_code_verifier(&self) -> String;

    fn generate_code_challenge(&self, verifier: &str) -> String;

    fn generate(&self) -> PkceVariables {
        let code_verifier = self.generate_code_verifier();
        let code_challenge = self.generate_code_challenge(&code_verifier);
        PkceVariables {
            code_verifier,
            code_challenge,
        }
    }
}

/// RFC 7636 `S256` generator backed by the OS random source
#[derive(Debug, Clone, Copy, Default)]
pub struct S256PkceGenerator;

impl PkceGenerator for S256PkceGenerator {
    fn generate_code_verifier(&self) -> String {
        let mut bytes = [0u8; VERIFIER_ENTROPY_BYTES];
        // OsRng panics if the platform RNG is unavailable, which is fatal anyway.
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn generate_code_challenge(&self, verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
