//! Transport-neutral plumbing between a remote peer and the realtime bridge.
//!
//! A transport owns the peer connection and talks to the bridge through a pair
//! of bounded channels. Dropping either end is how a disconnect is observed:
//! the bridge sees its inbound channel close when the peer goes away, and the
//! transport sees its outbound channel close when the bridge stops.

#[cfg(feature = "livekit")]
pub mod livekit;
pub mod ws;

use nova_core::Speaker;
use tokio::sync::mpsc;

/// Frames buffered in each direction before senders wait.
pub const LINK_CAPACITY: usize = 128;

/// Something the peer sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// 24 kHz mono PCM16 samples.
    Audio(Vec<i16>),
    /// A typed user message.
    Text(String),
}

/// Something to deliver to the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Transcript { speaker: Speaker, text: String },
    Audio(Vec<i16>),
    SpeakingStart,
    SpeakingEnd,
    Error(String),
}

/// The bridge's side of a peer connection.
#[derive(Debug)]
pub struct TransportLink {
    pub inbound: mpsc::Receiver<Inbound>,
    pub outbound: mpsc::Sender<Outbound>,
}

/// The transport's side of a peer connection.
#[derive(Debug)]
pub struct PeerEnd {
    pub inbound: mpsc::Sender<Inbound>,
    pub outbound: mpsc::Receiver<Outbound>,
}

/// Creates a connected link/peer pair.
pub fn link(capacity: usize) -> (TransportLink, PeerEnd) {
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    (
        TransportLink {
            inbound: inbound_rx,
            outbound: outbound_tx,
        },
        PeerEnd {
            inbound: inbound_tx,
            outbound: outbound_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropping_the_peer_closes_the_inbound_side() {
        let (mut link, peer) = link(4);
        peer.inbound.send(Inbound::Text("hi".into())).await.unwrap();
        drop(peer);

        assert_eq!(link.inbound.recv().await, Some(Inbound::Text("hi".into())));
        assert_eq!(link.inbound.recv().await, None);
        assert!(link.outbound.send(Outbound::SpeakingEnd).await.is_err());
    }
}
