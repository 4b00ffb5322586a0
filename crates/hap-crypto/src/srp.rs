//! SRP-6a for pair-setup, accessory (server) and controller (client) roles.
//!
//! Uses 3072-bit prime (RFC 5054), generator g=5, SHA-512 and the fixed
//! username `Pair-Setup`. The password is the accessory setup code.

use crate::keys::SharedSecret;
use hap_core::device::SetupCode;
use hap_core::error::CryptoError;
use num_bigint::{BigUint, RandBigInt};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// SRP username used by pair-setup.
pub const SRP_USERNAME: &[u8] = b"Pair-Setup";

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// N size in bytes (3072 bits = 384 bytes).
pub const N_BYTES: usize = 384;

/// RFC 5054 3072-bit prime N as hex string.
const RFC5054_N_3072: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
    "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
    "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
    "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
    "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
    "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
    "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D",
    "04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D",
    "B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226",
    "1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC",
    "E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF"
);

/// SRP-6a parameters (3072-bit, RFC 5054).
pub struct SrpParams {
    /// Prime modulus N.
    pub n: BigUint,
    /// Generator g (always 5).
    pub g: BigUint,
}

impl Default for SrpParams {
    fn default() -> Self {
        let n = BigUint::parse_bytes(RFC5054_N_3072.as_bytes(), 16)
            .expect("Invalid RFC 5054 prime constant");
        let g = BigUint::from(5u32);
        Self { n, g }
    }
}

/// Accessory side of one pair-setup SRP exchange.
///
/// Lifecycle: [`SrpServer::new`] for M2, then
/// [`set_client_public_key`](SrpServer::set_client_public_key) and
/// [`verify_client_proof`](SrpServer::verify_client_proof) for M3. The proof
/// and session key only become available once the controller's proof matched.
#[derive(ZeroizeOnDrop)]
pub struct SrpServer {
    #[zeroize(skip)]
    params: SrpParams,
    salt: [u8; SALT_LEN],
    verifier: Vec<u8>,
    private_key: Vec<u8>,
    #[zeroize(skip)]
    public_key: BigUint,
    #[zeroize(skip)]
    client_public_key: Option<BigUint>,
    session_key: Option<SharedSecret>,
    server_proof: Option<Vec<u8>>,
}

impl SrpServer {
    /// Start an exchange for the given setup code with a fresh salt and key.
    pub fn new(setup_code: &SetupCode) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let b = OsRng.gen_biguint(256);
        Self::with_private_key(setup_code.as_str().as_bytes(), salt, &b.to_bytes_be())
    }

    /// Build an exchange from explicit salt and private key.
    ///
    /// Intended for reproducible transcripts; production code uses [`SrpServer::new`].
    pub fn with_private_key(password: &[u8], salt: [u8; SALT_LEN], private_key: &[u8]) -> Self {
        let params = SrpParams::default();

        // v = g^x mod N
        let x = compute_x(&salt, SRP_USERNAME, password);
        let verifier = params.g.modpow(&x, &params.n);

        // B = (k*v + g^b) mod N
        let b = BigUint::from_bytes_be(private_key);
        let k = compute_k(&params);
        let g_b = params.g.modpow(&b, &params.n);
        let public_key = ((&k * &verifier) + g_b) % &params.n;

        Self {
            params,
            salt,
            verifier: verifier.to_bytes_be(),
            private_key: private_key.to_vec(),
            public_key,
            client_public_key: None,
            session_key: None,
            server_proof: None,
        }
    }

    /// Salt sent in M2.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Server public key B, padded to 384 bytes.
    pub fn public_key(&self) -> Vec<u8> {
        pad_to_n(&self.public_key)
    }

    /// Accept the controller's public key A and compute the shared secret.
    ///
    /// Rejects A ≡ 0 (mod N), which would force a known session key.
    pub fn set_client_public_key(&mut self, client_public: &[u8]) -> Result<(), CryptoError> {
        let a = BigUint::from_bytes_be(client_public);
        if &a % &self.params.n == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey(
                "SRP client public key A mod N = 0".to_string(),
            ));
        }

        // u = H(PAD(A) || PAD(B))
        let u = compute_u(&a, &self.public_key);
        if u == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey("SRP u = 0".to_string()));
        }

        // S = (A * v^u)^b mod N
        let v = BigUint::from_bytes_be(&self.verifier);
        let b = BigUint::from_bytes_be(&self.private_key);
        let v_u = v.modpow(&u, &self.params.n);
        let base = (&a * &v_u) % &self.params.n;
        let s = base.modpow(&b, &self.params.n);

        self.session_key = Some(SharedSecret::new(hash_padded(&s)));
        self.client_public_key = Some(a);
        self.server_proof = None;
        Ok(())
    }

    /// Check the controller's proof M1 in constant time.
    ///
    /// On success the server proof M2 becomes available. Returns `false` when
    /// no client public key has been supplied yet.
    pub fn verify_client_proof(&mut self, client_proof: &[u8]) -> bool {
        let (a, k) = match (&self.client_public_key, &self.session_key) {
            (Some(a), Some(k)) => (a, k),
            _ => return false,
        };

        let expected = compute_m1(&self.params, SRP_USERNAME, &self.salt, a, &self.public_key, k.as_bytes());
        if !bool::from(expected.ct_eq(client_proof)) {
            self.server_proof = None;
            return false;
        }

        self.server_proof = Some(compute_m2(a, &expected, k.as_bytes()));
        true
    }

    /// Server proof M2, present only after a successful proof check.
    pub fn server_proof(&self) -> Option<&[u8]> {
        self.server_proof.as_deref()
    }

    /// Raw session key K, present only after a successful proof check.
    pub fn session_key(&self) -> Option<&SharedSecret> {
        self.server_proof.as_ref().and(self.session_key.as_ref())
    }
}

/// Controller side of a pair-setup SRP exchange.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SrpClient {
    #[zeroize(skip)]
    params: SrpParams,
    identity: Vec<u8>,
    password: Vec<u8>,
    private_key: Vec<u8>,
    #[zeroize(skip)]
    public_key: BigUint,
}

/// Server challenge containing salt and public key (M2).
pub struct SrpChallenge {
    pub salt: [u8; SALT_LEN],
    pub server_public_key: Vec<u8>,
}

/// Controller proof and the values it expects back.
pub struct SrpProof {
    pub client_proof: Vec<u8>,
    pub shared_secret: SharedSecret,
    pub expected_server_proof: Vec<u8>,
}

impl SrpClient {
    /// Create new SRP client with identity and password.
    pub fn new(identity: &[u8], password: &[u8]) -> Self {
        let a = OsRng.gen_biguint(256);
        Self::with_private_key(identity, password, &a.to_bytes_be())
    }

    /// Create SRP client with a specific private key.
    pub fn with_private_key(identity: &[u8], password: &[u8], private_key: &[u8]) -> Self {
        let params = SrpParams::default();
        let a = BigUint::from_bytes_be(private_key);
        let public_key = params.g.modpow(&a, &params.n);

        Self {
            params,
            identity: identity.to_vec(),
            password: password.to_vec(),
            private_key: private_key.to_vec(),
            public_key,
        }
    }

    /// Get client public key A (384 bytes for 3072-bit).
    pub fn public_key(&self) -> Vec<u8> {
        pad_to_n(&self.public_key)
    }

    /// Process server's challenge and generate proof.
    pub fn process_challenge(&self, challenge: &SrpChallenge) -> Result<SrpProof, CryptoError> {
        let b = BigUint::from_bytes_be(&challenge.server_public_key);

        if &b % &self.params.n == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey(
                "SRP server public key B mod N = 0".to_string(),
            ));
        }

        let a = BigUint::from_bytes_be(&self.private_key);

        let u = compute_u(&self.public_key, &b);
        if u == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey("SRP u = 0".to_string()));
        }

        let x = compute_x(&challenge.salt, &self.identity, &self.password);
        let k = compute_k(&self.params);

        // S = (B - k * g^x)^(a + u*x) mod N
        let g_x = self.params.g.modpow(&x, &self.params.n);
        let k_gx = (&k * &g_x) % &self.params.n;
        let base = if b >= k_gx {
            (&b - &k_gx) % &self.params.n
        } else {
            (&b + &self.params.n - &k_gx) % &self.params.n
        };
        let exponent = &a + &u * &x;
        let s = base.modpow(&exponent, &self.params.n);

        let shared_secret = hash_padded(&s);
        let client_proof = compute_m1(
            &self.params,
            &self.identity,
            &challenge.salt,
            &self.public_key,
            &b,
            &shared_secret,
        );
        let expected_server_proof = compute_m2(&self.public_key, &client_proof, &shared_secret);

        Ok(SrpProof {
            client_proof,
            shared_secret: SharedSecret::new(shared_secret),
            expected_server_proof,
        })
    }

    /// Verify server's proof M2.
    pub fn verify_server_proof(&self, proof: &[u8], expected: &[u8]) -> bool {
        proof.ct_eq(expected).into()
    }
}

/// Compute M1 = H(H(N) XOR H(g) || H(I) || salt || PAD(A) || PAD(B) || K)
fn compute_m1(
    params: &SrpParams,
    identity: &[u8],
    salt: &[u8],
    a: &BigUint,
    b: &BigUint,
    k: &[u8],
) -> Vec<u8> {
    let h_n = Sha512::digest(pad_to_n(&params.n));
    // H(g) is over the raw generator byte, unlike k which pads g.
    let h_g = Sha512::digest(params.g.to_bytes_be());

    let mut xor_result = [0u8; 64];
    for (out, (n, g)) in xor_result.iter_mut().zip(h_n.iter().zip(h_g.iter())) {
        *out = n ^ g;
    }

    let h_i = Sha512::digest(identity);

    let mut hasher = Sha512::new();
    hasher.update(xor_result);
    hasher.update(h_i);
    hasher.update(salt);
    hasher.update(pad_to_n(a));
    hasher.update(pad_to_n(b));
    hasher.update(k);
    hasher.finalize().to_vec()
}

/// Compute M2 = H(PAD(A) || M1 || K)
fn compute_m2(a: &BigUint, m1: &[u8], k: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_n(a));
    hasher.update(m1);
    hasher.update(k);
    hasher.finalize().to_vec()
}

/// K = H(PAD(S))
fn hash_padded(s: &BigUint) -> Vec<u8> {
    Sha512::digest(pad_to_n(s)).to_vec()
}

/// Pad BigUint to N_BYTES with leading zeros.
fn pad_to_n(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= N_BYTES {
        bytes[bytes.len() - N_BYTES..].to_vec()
    } else {
        let mut padded = vec![0u8; N_BYTES - bytes.len()];
        padded.extend_from_slice(&bytes);
        padded
    }
}

/// Compute k = SHA512(N || PAD(g)).
fn compute_k(params: &SrpParams) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_n(&params.n));
    hasher.update(pad_to_n(&params.g));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// Compute u = SHA512(PAD(A) || PAD(B)).
fn compute_u(a: &BigUint, b: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_n(a));
    hasher.update(pad_to_n(b));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// Compute x = SHA512(salt || SHA512(identity || ":" || password)).
fn compute_x(salt: &[u8], identity: &[u8], password: &[u8]) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(identity);
    hasher.update(b":");
    hasher.update(password);
    let inner_hash = hasher.finalize();

    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(inner_hash);
    BigUint::from_bytes_be(&hasher.finalize())
}
