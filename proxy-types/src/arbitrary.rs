//! `quickcheck::Arbitrary` impls for the core newtypes, gated behind the
//! `quickcheck` feature so downstream crates can generate property-test
//! fixtures without this crate always depending on `quickcheck`.

use quickcheck::{Arbitrary, Gen};

use crate::message::{SessionId, Tag};
use crate::names::{ComponentName, GroupName, PeerType};

fn arbitrary_token(g: &mut Gen) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let len = usize::arbitrary(g) % 8 + 1;
    (0..len)
        .map(|_| {
            let idx = usize::arbitrary(g) % ALPHABET.len();
            ALPHABET[idx] as char
        })
        .collect()
}

impl Arbitrary for ComponentName {
    fn arbitrary(g: &mut Gen) -> Self {
        ComponentName::new(arbitrary_token(g))
    }
}

impl Arbitrary for PeerType {
    fn arbitrary(g: &mut Gen) -> Self {
        PeerType::new(arbitrary_token(g))
    }
}

impl Arbitrary for GroupName {
    fn arbitrary(g: &mut Gen) -> Self {
        GroupName::new(arbitrary_token(g))
    }
}

impl Arbitrary for Tag {
    fn arbitrary(g: &mut Gen) -> Self {
        Tag::new(arbitrary_token(g))
    }
}

impl Arbitrary for SessionId {
    fn arbitrary(g: &mut Gen) -> Self {
        SessionId::new(arbitrary_token(g))
    }
}
