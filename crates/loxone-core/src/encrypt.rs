// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Command encryption (C4): optional AES-256-CBC + RSA-PKCS1v15 envelope
//! around command URLs, enabled only when the Miniserver's public key was
//! loaded successfully.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use der::{Decode, Encode};
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use x509_cert::Certificate;

use crate::error::LoxoneError;
use crate::http::urlencode;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

pub struct CommandEncryptor {
    public_key: RsaPublicKey,
}

impl CommandEncryptor {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self { public_key }
    }

    /// Parse a PEM-encoded X.509 certificate and extract its RSA public key
    /// (spec §4.3 step 2).
    pub fn from_pem(pem: &str) -> Result<Self, LoxoneError> {
        let der_bytes = rustls_pemfile::certs(&mut pem.as_bytes())
            .next()
            .ok_or_else(|| LoxoneError::Decode("no certificate found in PEM".to_owned()))?
            .map_err(|e| LoxoneError::Decode(e.to_string()))?;

        let cert = Certificate::from_der(der_bytes.as_ref())
            .map_err(|e| LoxoneError::Decode(format!("invalid X.509 certificate: {e}")))?;

        let spki = &cert.tbs_certificate.subject_public_key_info;
        let spki_der = spki.to_der().map_err(|e| LoxoneError::Decode(e.to_string()))?;

        let public_key = RsaPublicKey::try_from(
            rsa::pkcs8::SubjectPublicKeyInfoRef::try_from(spki_der.as_slice())
                .map_err(|e| LoxoneError::Decode(e.to_string()))?,
        )
        .map_err(|e| LoxoneError::Decode(format!("not an RSA key: {e}")))?;

        Ok(Self::new(public_key))
    }

    /// Encrypt an authenticated command path per spec §4.4 steps 1-6.
    pub fn encrypt(&self, command: &str) -> Result<String, LoxoneError> {
        let mut rng = rand::rng();

        let mut salt_bytes = [0u8; 2];
        rng.fill_bytes(&mut salt_bytes);
        let salt_hex: String = salt_bytes.iter().map(|b| format!("{b:02x}")).collect();
        let plaintext = format!("salt/{salt_hex}/{command}");

        let mut aes_key = [0u8; 32];
        rng.fill_bytes(&mut aes_key);
        let mut iv = [0u8; 16];
        rng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&aes_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        let ciphertext_b64 = BASE64.encode(ciphertext);

        let key_hex: String = aes_key.iter().map(|b| format!("{b:02x}")).collect();
        let iv_hex: String = iv.iter().map(|b| format!("{b:02x}")).collect();
        let session_key_plain = format!("{key_hex}:{iv_hex}");

        let mut rng2 = rand::rngs::OsRng;
        let session_key_encrypted = self
            .public_key
            .encrypt(&mut rng2, Pkcs1v15Encrypt, session_key_plain.as_bytes())
            .map_err(|e| LoxoneError::Decode(format!("RSA encryption failed: {e}")))?;
        let session_key_b64 = BASE64.encode(session_key_encrypted);

        Ok(format!(
            "jdev/sys/enc/{}?sk={}",
            urlencode(&ciphertext_b64),
            urlencode(&session_key_b64)
        ))
    }
}
