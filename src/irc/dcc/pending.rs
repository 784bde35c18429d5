//! Offers from peers that the user has not accepted yet.
//!
//! The newest offer from a peer wins: `put` overwrites silently.

use std::net::Ipv4Addr;
use std::time::SystemTime;

use dashmap::DashMap;

use super::PeerKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChatOffer {
    pub server_id: String,
    pub peer_nick: String,
    pub host: Ipv4Addr,
    pub port: u16,
    pub offered_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSendOffer {
    pub server_id: String,
    pub peer_nick: String,
    pub file_name: String,
    pub host: Ipv4Addr,
    pub port: u16,
    pub size: u64,
    pub offered_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct PendingOffers {
    chats: DashMap<PeerKey, PendingChatOffer>,
    sends: DashMap<PeerKey, PendingSendOffer>,
}

impl PendingOffers {
    /// Returns the offer it displaced, if any.
    pub fn put_chat(&self, offer: PendingChatOffer) -> Option<PendingChatOffer> {
        let key = PeerKey::new(&offer.server_id, &offer.peer_nick);
        self.chats.insert(key, offer)
    }

    pub fn get_chat(&self, key: &PeerKey) -> Option<PendingChatOffer> {
        self.chats.get(key).map(|o| o.value().clone())
    }

    pub fn remove_chat(&self, key: &PeerKey) -> Option<PendingChatOffer> {
        self.chats.remove(key).map(|(_, o)| o)
    }

    pub fn put_send(&self, offer: PendingSendOffer) -> Option<PendingSendOffer> {
        let key = PeerKey::new(&offer.server_id, &offer.peer_nick);
        self.sends.insert(key, offer)
    }

    /// Puts a consumed offer back after a failed transfer, unless the peer
    /// has made a newer offer in the meantime.
    pub fn restore_send(&self, offer: PendingSendOffer) -> bool {
        let key = PeerKey::new(&offer.server_id, &offer.peer_nick);
        let mut restored = false;
        self.sends.entry(key).or_insert_with(|| {
            restored = true;
            offer
        });
        restored
    }

    pub fn get_send(&self, key: &PeerKey) -> Option<PendingSendOffer> {
        self.sends.get(key).map(|o| o.value().clone())
    }

    pub fn remove_send(&self, key: &PeerKey) -> Option<PendingSendOffer> {
        self.sends.remove(key).map(|(_, o)| o)
    }

    pub fn chats_for(&self, server_id: &str) -> Vec<PendingChatOffer> {
        self.chats
            .iter()
            .filter(|e| e.key().server_id == server_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn sends_for(&self, server_id: &str) -> Vec<PendingSendOffer> {
        self.sends
            .iter()
            .filter(|e| e.key().server_id == server_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn clear(&self) {
        self.chats.clear();
        self.sends.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn send_offer(nick: &str, file_name: &str, size: u64) -> PendingSendOffer {
        PendingSendOffer {
            server_id: "net".to_owned(),
            peer_nick: nick.to_owned(),
            file_name: file_name.to_owned(),
            host: Ipv4Addr::new(192, 168, 0, 1),
            port: 51000,
            size,
            offered_at: SystemTime::now(),
        }
    }

    #[test]
    fn second_offer_replaces_the_first() {
        let pending = PendingOffers::default();
        let first = send_offer("alice", "a.txt", 1);
        let second = send_offer("Alice", "b.txt", 2);

        assert!(pending.put_send(first.clone()).is_none());
        assert_eq!(pending.put_send(second.clone()), Some(first));

        assert_eq!(pending.sends_for("net"), vec![second.clone()]);
        assert_eq!(
            pending.get_send(&PeerKey::new("net", "alice")),
            Some(second)
        );
    }

    #[test]
    fn chat_and_send_offers_are_independent() {
        let pending = PendingOffers::default();
        pending.put_send(send_offer("alice", "a.txt", 1));
        pending.put_chat(PendingChatOffer {
            server_id: "net".to_owned(),
            peer_nick: "alice".to_owned(),
            host: Ipv4Addr::LOCALHOST,
            port: 4000,
            offered_at: SystemTime::now(),
        });

        let key = PeerKey::new("net", "alice");
        assert!(pending.remove_chat(&key).is_some());
        assert!(pending.remove_chat(&key).is_none());
        assert!(pending.get_send(&key).is_some());
    }

    #[test]
    fn restore_does_not_clobber_a_newer_offer() {
        let pending = PendingOffers::default();
        let key = PeerKey::new("net", "alice");
        let consumed = send_offer("alice", "old.txt", 1);

        assert!(pending.restore_send(consumed.clone()));
        assert_eq!(pending.remove_send(&key), Some(consumed.clone()));

        let newer = send_offer("alice", "new.txt", 2);
        pending.put_send(newer.clone());
        assert!(!pending.restore_send(consumed));
        assert_eq!(pending.get_send(&key), Some(newer));
    }

    #[test]
    fn listing_is_per_server() {
        let pending = PendingOffers::default();
        pending.put_send(send_offer("alice", "a.txt", 1));
        let mut elsewhere = send_offer("alice", "a.txt", 1);
        elsewhere.server_id = "other".to_owned();
        pending.put_send(elsewhere);

        assert_eq!(pending.sends_for("net").len(), 1);
        assert_eq!(pending.sends_for("other").len(), 1);

        pending.clear();
        assert!(pending.sends_for("net").is_empty());
    }
}
