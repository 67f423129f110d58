//! LiveKit room transport.
//!
//! The agent joins the configured room with a token minted from the API key
//! and secret, publishes one 24 kHz mono track for model audio and bridges the
//! first remote audio track it is subscribed to.

use super::{Inbound, Outbound, PeerEnd};
use crate::audio_utils::{PCM16_CHANNELS, PCM16_SAMPLE_RATE};
use crate::config::LiveKitConfig;
use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::borrow::Cow;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const AGENT_IDENTITY: &str = "voice-agent";
const OUTPUT_QUEUE_MS: u32 = 100;

/// Mints a room-join token for the agent.
pub fn access_token(config: &LiveKitConfig) -> Result<String> {
    AccessToken::with_api_key(&config.api_key, &config.api_secret)
        .with_identity(AGENT_IDENTITY)
        .with_grants(VideoGrants {
            room_join: true,
            room: config.room.clone(),
            can_publish: true,
            can_subscribe: true,
            ..Default::default()
        })
        .to_jwt()
        .context("Failed to mint LiveKit access token")
}

pub struct LiveKitPeer {
    room: Room,
    events: UnboundedReceiver<RoomEvent>,
    source: NativeAudioSource,
}

impl LiveKitPeer {
    /// Connects to the room and publishes the agent's voice track.
    #[instrument(skip_all, fields(room = %config.room))]
    pub async fn join(config: &LiveKitConfig) -> Result<Self> {
        let token = access_token(config)?;
        let (room, events) = Room::connect(&config.url, &token, RoomOptions::default())
            .await
            .context("Failed to connect to LiveKit room")?;

        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            PCM16_SAMPLE_RATE,
            PCM16_CHANNELS,
            OUTPUT_QUEUE_MS,
        );
        let track =
            LocalAudioTrack::create_audio_track("agent-voice", RtcAudioSource::Native(source.clone()));
        room.local_participant()
            .publish_track(LocalTrack::Audio(track), TrackPublishOptions::default())
            .await
            .context("Failed to publish agent audio track")?;

        info!("Joined LiveKit room.");
        Ok(Self {
            room,
            events,
            source,
        })
    }

    /// Waits until a participant's audio track is subscribed.
    pub async fn wait_for_audio(&mut self) -> Result<RemoteAudioTrack> {
        while let Some(event) = self.events.recv().await {
            if let RoomEvent::TrackSubscribed {
                track: RemoteTrack::Audio(track),
                participant,
                ..
            } = event
            {
                info!(participant = ?participant.identity(), "Subscribed to remote audio.");
                return Ok(track);
            }
        }
        bail!("LiveKit room closed before any participant published audio")
    }

    /// Pumps audio between the room and the bridge until either side stops.
    pub async fn run(mut self, track: RemoteAudioTrack, peer: PeerEnd, cancel: CancellationToken) {
        let PeerEnd {
            inbound,
            mut outbound,
        } = peer;
        let mut stream = NativeAudioStream::new(
            track.rtc_track(),
            PCM16_SAMPLE_RATE as i32,
            PCM16_CHANNELS as i32,
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = stream.next() => match frame {
                    Some(frame) => {
                        if inbound.send(Inbound::Audio(frame.data.to_vec())).await.is_err() {
                            debug!("Bridge stopped accepting input.");
                            break;
                        }
                    }
                    None => {
                        info!("Remote audio track ended.");
                        break;
                    }
                },
                out = outbound.recv() => match out {
                    Some(Outbound::Audio(samples)) => {
                        let frame = AudioFrame {
                            data: Cow::Borrowed(&samples),
                            sample_rate: PCM16_SAMPLE_RATE,
                            num_channels: PCM16_CHANNELS,
                            samples_per_channel: samples.len() as u32 / PCM16_CHANNELS,
                        };
                        if let Err(e) = self.source.capture_frame(&frame).await {
                            warn!(error = %e, "Failed to push audio to LiveKit.");
                        }
                    }
                    Some(Outbound::Transcript { speaker, text }) => debug!(?speaker, %text, "Transcript"),
                    Some(Outbound::Error(message)) => warn!(%message, "Bridge reported an error."),
                    Some(Outbound::SpeakingStart) | Some(Outbound::SpeakingEnd) => {}
                    None => break,
                },
                event = self.events.recv() => match event {
                    Some(RoomEvent::Disconnected { reason }) => {
                        info!(?reason, "Disconnected from LiveKit room.");
                        break;
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        if let Err(e) = self.room.close().await {
            warn!(error = %e, "Failed to leave LiveKit room cleanly.");
        }
    }
}
