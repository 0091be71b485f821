//! Dragonfly key exchange over NIST P-256 as used by EAP-PWD (RFC 5931).
//!
//! The password element is found by hunting and pecking over a fixed number
//! of counters. Every counter is evaluated and the first valid x-coordinate
//! is kept with constant-time selection, so the number of iterations does
//! not depend on the password.

use hmac::{Hmac, Mac};
use p256::elliptic_curve::ff::{Field, PrimeField};
use p256::elliptic_curve::group::Group;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{AffinePoint, EncodedPoint, FieldBytes, FieldElement, ProjectivePoint, Scalar};
use sha2::Sha256;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use thiserror::Error;

use crate::core::eap_pwd::{PwdCommit, CONFIRM_LENGTH, ELEMENT_LENGTH, SCALAR_LENGTH};

type HmacSha256 = Hmac<Sha256>;

const HUNTING_AND_PECKING_LABEL: &[u8] = b"EAP-pwd Hunting And Pecking";
const HUNTING_AND_PECKING_ROUNDS: u8 = 40;
const PRIME_BITS: u16 = 256;
const EAP_TYPE_PWD: u8 = 52;
const SESSION_KEY_BITS: u16 = 1024;
pub const MSK_LENGTH: usize = 64;

/// (p - 1) / 2 as little-endian 64-bit limbs.
const P_MINUS_1_OVER_2: [u64; 4] = [
    0xffff_ffff_ffff_ffff,
    0x0000_0000_7fff_ffff,
    0x8000_0000_0000_0000,
    0x7fff_ffff_8000_0000,
];

const CURVE_B: [u8; 32] = [
    0x5a, 0xc6, 0x35, 0xd8, 0xaa, 0x3a, 0x93, 0xe7, 0xb3, 0xeb, 0xbd, 0x55, 0x76, 0x98, 0x86, 0xbc,
    0x65, 0x1d, 0x06, 0xb0, 0xcc, 0x53, 0xb0, 0xf6, 0x3b, 0xce, 0x3c, 0x3e, 0x27, 0xd2, 0x60, 0x4b,
];

#[derive(Error, Debug, PartialEq)]
pub enum DragonflyError {
    #[error("no password element found after {0} rounds")]
    NoPasswordElementError(u8),
    #[error("peer scalar is out of range")]
    InvalidScalarError(),
    #[error("peer element is not a point on the curve")]
    InvalidElementError(),
    #[error("peer reflected our commit")]
    ReflectionError(),
    #[error("shared secret is the point at infinity")]
    IdentityElementError(),
    #[error("failed to initialize hmac-sha256: {0}")]
    KeyError(String),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Role {
    Server,
    Peer,
}

/// H(x) = HMAC-SHA256(0^32, x)
fn h(parts: &[&[u8]]) -> [u8; 32] {
    // HMAC pads short keys with zeros, so the block sized zero key equals 0^32.
    let mut mac = <HmacSha256 as Mac>::new(&Default::default());
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// KDF(key, label, bits) from RFC 5931 section 2.5.
pub fn kdf(key: &[u8], label: &[u8], bits: u16) -> Result<Vec<u8>, DragonflyError> {
    let len = (bits as usize + 7) / 8;
    let mut out: Vec<u8> = Vec::with_capacity(len + 32);
    let mut prev: Vec<u8> = vec![];
    let mut i: u16 = 1;
    while out.len() < len {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| DragonflyError::KeyError(e.to_string()))?;
        mac.update(&prev);
        mac.update(&i.to_be_bytes());
        mac.update(label);
        mac.update(&bits.to_be_bytes());
        prev = mac.finalize().into_bytes().to_vec();
        out.extend(&prev);
        i += 1;
    }

    out.truncate(len);
    if bits % 8 != 0 {
        out[len - 1] &= 0xff << (8 - bits % 8);
    }
    Ok(out)
}

/// pwd-seed for one hunting and pecking round. The token is hashed in
/// little-endian order and every identity is NUL terminated.
pub fn seed(token: u32, peer_id: &[u8], server_id: &[u8], password: &[u8], counter: u8) -> [u8; 32] {
    h(&[
        &token.to_le_bytes(),
        peer_id,
        &[0],
        server_id,
        &[0],
        password,
        &[0],
        &[counter],
    ])
}

fn legendre_is(value: &FieldElement, expected: &FieldElement) -> Choice {
    value.pow_vartime(&P_MINUS_1_OVER_2).ct_eq(expected)
}

fn random_nonzero_field_element() -> FieldElement {
    let mut rng = rand::thread_rng();
    loop {
        let r = FieldElement::random(&mut rng);
        if !bool::from(r.is_zero()) {
            return r;
        }
    }
}

/// A random quadratic residue and a random non-residue used to blind the residuosity test.
fn residue_blinds() -> (FieldElement, FieldElement) {
    let minus_one = -FieldElement::ONE;
    let mut qr = random_nonzero_field_element();
    while !bool::from(legendre_is(&qr, &FieldElement::ONE)) {
        qr = random_nonzero_field_element();
    }
    let mut qnr = random_nonzero_field_element();
    while !bool::from(legendre_is(&qnr, &minus_one)) {
        qnr = random_nonzero_field_element();
    }
    (qr, qnr)
}

/// Tests whether `value` is a quadratic residue without exposing it to the exponentiation:
/// value·r² is multiplied by either the residue or the non-residue depending on a random bit
/// and the Legendre symbol is compared against the matching expectation.
fn is_quadratic_residue(value: &FieldElement, qr: &FieldElement, qnr: &FieldElement) -> Choice {
    let r = random_nonzero_field_element();
    let use_qr = r.is_odd();

    let blind = FieldElement::conditional_select(qnr, qr, use_qr);
    let expected = FieldElement::conditional_select(&-FieldElement::ONE, &FieldElement::ONE, use_qr);
    legendre_is(&(*value * r.square() * blind), &expected)
}

fn curve_b() -> Result<FieldElement, DragonflyError> {
    Option::<FieldElement>::from(FieldElement::from_repr(FieldBytes::clone_from_slice(&CURVE_B)))
        .ok_or(DragonflyError::NoPasswordElementError(0))
}

/// Derives the password element PWE (RFC 5931 section 2.8.3.1).
pub fn compute_password_element(
    token: u32,
    peer_id: &[u8],
    server_id: &[u8],
    password: &[u8],
) -> Result<AffinePoint, DragonflyError> {
    let b = curve_b()?;
    let (qr, qnr) = residue_blinds();

    let mut found = Choice::from(0);
    let mut saved_x = FieldElement::ZERO;
    let mut saved_lsb = 0u8;

    for counter in 1..=HUNTING_AND_PECKING_ROUNDS {
        let pwd_seed = seed(token, peer_id, server_id, password, counter);
        let pwd_value = kdf(&pwd_seed, HUNTING_AND_PECKING_LABEL, PRIME_BITS)?;

        let candidate = FieldElement::from_repr(FieldBytes::clone_from_slice(&pwd_value));
        let in_range = candidate.is_some();
        let x = candidate.unwrap_or(FieldElement::ZERO);

        let y_squared = x.square() * x - (x + x + x) + b;
        let take = in_range & is_quadratic_residue(&y_squared, &qr, &qnr) & !found;

        saved_x = FieldElement::conditional_select(&saved_x, &x, take);
        saved_lsb = u8::conditional_select(&saved_lsb, &(pwd_seed[31] & 1), take);
        found |= take;
    }

    if !bool::from(found) {
        return Err(DragonflyError::NoPasswordElementError(
            HUNTING_AND_PECKING_ROUNDS,
        ));
    }

    let y_squared = saved_x.square() * saved_x - (saved_x + saved_x + saved_x) + b;
    let y = Option::<FieldElement>::from(y_squared.sqrt())
        .ok_or(DragonflyError::NoPasswordElementError(HUNTING_AND_PECKING_ROUNDS))?;
    let flip = Choice::from(y.is_odd().unwrap_u8() ^ saved_lsb);
    let y = FieldElement::conditional_select(&y, &-y, flip);

    let encoded = EncodedPoint::from_affine_coordinates(&saved_x.to_repr(), &y.to_repr(), false);
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or(DragonflyError::NoPasswordElementError(HUNTING_AND_PECKING_ROUNDS))
}

fn encode_element(point: &ProjectivePoint) -> Result<[u8; ELEMENT_LENGTH], DragonflyError> {
    if bool::from(point.is_identity()) {
        return Err(DragonflyError::IdentityElementError());
    }
    let encoded = point.to_affine().to_encoded_point(false);
    let mut element = [0u8; ELEMENT_LENGTH];
    element.copy_from_slice(&encoded.as_bytes()[1..]);
    Ok(element)
}

fn decode_element(element: &[u8; ELEMENT_LENGTH]) -> Result<ProjectivePoint, DragonflyError> {
    let tagged = [&[0x04u8][..], &element[..]].concat();
    let encoded =
        EncodedPoint::from_bytes(tagged).map_err(|_| DragonflyError::InvalidElementError())?;
    let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    point
        .map(ProjectivePoint::from)
        .ok_or(DragonflyError::InvalidElementError())
}

fn decode_scalar(scalar: &[u8; SCALAR_LENGTH]) -> Result<Scalar, DragonflyError> {
    let scalar: Option<Scalar> = Scalar::from_repr(FieldBytes::clone_from_slice(scalar)).into();
    match scalar {
        Some(s) if !bool::from(s.is_zero()) && s != Scalar::ONE => Ok(s),
        _ => Err(DragonflyError::InvalidScalarError()),
    }
}

fn encode_scalar(scalar: &Scalar) -> [u8; SCALAR_LENGTH] {
    let mut bs = [0u8; SCALAR_LENGTH];
    bs.copy_from_slice(&scalar.to_repr());
    bs
}

/// One side of a Dragonfly exchange after its commit has been generated.
#[derive(Clone)]
pub struct Dragonfly {
    role: Role,
    pwe: ProjectivePoint,
    ciphersuite: [u8; 4],
    private: Scalar,
    commit: PwdCommit,
}

impl Dragonfly {
    pub fn new(
        role: Role,
        pwe: &AffinePoint,
        ciphersuite: [u8; 4],
    ) -> Result<Self, DragonflyError> {
        let pwe = ProjectivePoint::from(*pwe);
        let mut rng = rand::thread_rng();
        loop {
            let private = Scalar::random(&mut rng);
            let mask = Scalar::random(&mut rng);
            let scalar = private + mask;
            if bool::from(private.is_zero() | mask.is_zero() | scalar.is_zero())
                || scalar == Scalar::ONE
            {
                continue;
            }

            let element = -(pwe * mask);
            return Ok(Dragonfly {
                role,
                pwe,
                ciphersuite,
                private,
                commit: PwdCommit {
                    element: encode_element(&element)?,
                    scalar: encode_scalar(&scalar),
                },
            });
        }
    }

    pub fn commit(&self) -> &PwdCommit {
        &self.commit
    }

    /// Validates the peer commit and computes the shared secret k = x(private·(s·PWE + E)).
    pub fn process_commit(&self, peer: &PwdCommit) -> Result<KeyConfirmation, DragonflyError> {
        let peer_scalar = decode_scalar(&peer.scalar)?;
        let peer_element = decode_element(&peer.element)?;
        if peer.element == self.commit.element && peer.scalar == self.commit.scalar {
            return Err(DragonflyError::ReflectionError());
        }

        let shared = (self.pwe * peer_scalar + peer_element) * self.private;
        if bool::from(shared.is_identity()) {
            return Err(DragonflyError::IdentityElementError());
        }
        let encoded = shared.to_affine().to_encoded_point(false);
        let x = encoded.x().ok_or(DragonflyError::IdentityElementError())?;

        let mut k = [0u8; 32];
        k.copy_from_slice(x);
        Ok(KeyConfirmation {
            role: self.role,
            k,
            ciphersuite: self.ciphersuite,
            own: self.commit.clone(),
            peer: peer.clone(),
        })
    }
}

/// Shared secret plus both commits, ready for the confirm exchange.
#[derive(Clone)]
pub struct KeyConfirmation {
    role: Role,
    k: [u8; 32],
    ciphersuite: [u8; 4],
    own: PwdCommit,
    peer: PwdCommit,
}

pub struct SessionKeys {
    pub msk: [u8; MSK_LENGTH],
    pub emsk: [u8; MSK_LENGTH],
}

impl KeyConfirmation {
    /// Confirm value this side sends.
    pub fn confirm(&self) -> [u8; CONFIRM_LENGTH] {
        h(&[
            &self.k,
            &self.own.element,
            &self.own.scalar,
            &self.peer.element,
            &self.peer.scalar,
            &self.ciphersuite,
        ])
    }

    /// Confirm value the other side must send.
    pub fn expected_peer_confirm(&self) -> [u8; CONFIRM_LENGTH] {
        h(&[
            &self.k,
            &self.peer.element,
            &self.peer.scalar,
            &self.own.element,
            &self.own.scalar,
            &self.ciphersuite,
        ])
    }

    pub fn verify_peer_confirm(&self, confirm: &[u8]) -> bool {
        bool::from(self.expected_peer_confirm()[..].ct_eq(confirm))
    }

    /// MSK ‖ EMSK = KDF(MK, EAP-PWD ‖ Method-ID, 1024)
    pub fn session_keys(&self) -> Result<SessionKeys, DragonflyError> {
        let (confirm_p, confirm_s, scalar_p, scalar_s) = match self.role {
            Role::Server => (
                self.expected_peer_confirm(),
                self.confirm(),
                &self.peer.scalar,
                &self.own.scalar,
            ),
            Role::Peer => (
                self.confirm(),
                self.expected_peer_confirm(),
                &self.own.scalar,
                &self.peer.scalar,
            ),
        };

        let method_id = h(&[&self.ciphersuite, scalar_p, scalar_s]);
        let mk = h(&[&self.k, &confirm_p, &confirm_s]);
        let keys = kdf(&mk, &[&[EAP_TYPE_PWD][..], &method_id[..]].concat(), SESSION_KEY_BITS)?;

        let mut msk = [0u8; MSK_LENGTH];
        let mut emsk = [0u8; MSK_LENGTH];
        msk.copy_from_slice(&keys[..MSK_LENGTH]);
        emsk.copy_from_slice(&keys[MSK_LENGTH..]);
        Ok(SessionKeys { msk, emsk })
    }
}
