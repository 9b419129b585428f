//! Property-based tests for the wire codec and the peer roster.

use lancast_core::{Peer, PeerRoster};
use lancast_wire::{Announcement, FileEntry, TransferHeader};
use proptest::prelude::*;
use std::collections::HashMap;
use std::net::IpAddr;

fn announcement_strategy() -> impl Strategy<Value = Announcement> {
    (
        any::<bool>(),
        "\\PC{0,64}",
        "[a-z]{1,16}",
        any::<u16>(),
    )
        .prop_map(|(hello, name, platform, port)| {
            if hello {
                Announcement::hello(name, platform, port)
            } else {
                Announcement::goodbye(name, platform, port)
            }
        })
}

fn entry_strategy() -> impl Strategy<Value = FileEntry> {
    // Sizes bounded so a generated set's total stays well inside u64
    ("[a-z0-9._ -]{1,24}(/[a-z0-9._ -]{1,24}){0,3}", 0..=u64::from(u32::MAX))
        .prop_map(|(path, size)| FileEntry::new(path, size))
}

proptest! {
    #[test]
    fn announcement_roundtrips(a in announcement_strategy()) {
        let buf = a.encode().unwrap();
        let decoded = Announcement::decode(&buf).unwrap();
        prop_assert_eq!(decoded, a);
    }

    #[test]
    fn announcement_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        // Arbitrary datagrams arrive off the network; any outcome but a
        // panic is acceptable
        let _ = Announcement::decode(&bytes);
    }

    #[test]
    fn files_header_roundtrips(entries in proptest::collection::vec(entry_strategy(), 0..16)) {
        let header = TransferHeader::files(entries.clone());
        let buf = header.encode().unwrap();

        let (decoded, consumed) = TransferHeader::decode(&buf).unwrap();
        prop_assert_eq!(consumed, buf.len());
        prop_assert_eq!(&decoded, &header);
        if let TransferHeader::Files { entries: got, .. } = decoded {
            prop_assert_eq!(got, entries);
        }
    }

    #[test]
    fn text_header_roundtrips(length in any::<u64>()) {
        let buf = TransferHeader::text(length).encode().unwrap();
        let (decoded, consumed) = TransferHeader::decode(&buf).unwrap();
        prop_assert_eq!(decoded, TransferHeader::Text { length });
        prop_assert_eq!(consumed, buf.len());
    }

    #[test]
    fn truncated_header_is_an_error_not_a_panic(
        entries in proptest::collection::vec(entry_strategy(), 0..8),
        cut_ratio in 0.0f64..1.0,
    ) {
        let buf = TransferHeader::files(entries).encode().unwrap();
        let cut = ((buf.len() as f64) * cut_ratio) as usize;
        if cut < buf.len() {
            prop_assert!(TransferHeader::decode(&buf[..cut]).is_err());
        }
    }

    #[test]
    fn header_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = TransferHeader::decode(&bytes);
    }

    /// The roster reflects, per address, whatever the last datagram said:
    /// present after HELLO, absent after GOODBYE.
    #[test]
    fn roster_matches_last_announcement_per_address(
        ops in proptest::collection::vec((0u8..8, any::<bool>()), 0..64)
    ) {
        let roster = PeerRoster::new();
        let mut expected: HashMap<IpAddr, bool> = HashMap::new();

        for (host, hello) in &ops {
            let addr = IpAddr::from([10, 0, 0, *host]);
            if *hello {
                roster.upsert(Peer::new(addr, format!("peer-{host}"), "linux", 4644));
            } else {
                roster.remove(&addr);
            }
            expected.insert(addr, *hello);
        }

        let listed: Vec<IpAddr> = roster.list().into_iter().map(|p| p.addr).collect();
        for (addr, present) in &expected {
            prop_assert_eq!(listed.contains(addr), *present, "address {}", addr);
        }
        // No duplicates, and the listing agrees with the count
        let mut deduped = listed.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), listed.len());
        prop_assert_eq!(listed.len(), roster.len());
    }
}
