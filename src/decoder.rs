use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;

use crate::measurement::Reading;
use crate::proto::{frame::Frame, ProtoError, Result};
use crate::rawpacket::RawPacket;

/// Turns frames into readings and publishes them to a single-slot mailbox.
///
/// The mailbox only ever holds the latest reading: a new packet replaces a
/// reading nobody has picked up yet.
#[derive(Debug)]
pub struct PacketDecoder {
    mailbox: watch::Sender<Option<Reading>>,
}

impl PacketDecoder {
    pub fn new() -> (Self, ReadingReceiver) {
        let (mailbox, rx) = watch::channel(None);
        (Self { mailbox }, ReadingReceiver { rx })
    }

    /// Decodes one frame and publishes the result.
    ///
    /// Frames failing the checksum or carrying an unknown mode/range are
    /// dropped, only the log knows about them.
    pub fn decode(&self, frame: &Frame) -> Option<Reading> {
        log::trace!("{:?}", frame);

        let ts = Utc::now();
        let reading = RawPacket::try_from(frame).and_then(|raw| Reading::try_from((&raw, ts)));
        match reading {
            Ok(reading) => {
                log::debug!("Reading: {} ({})", reading, reading.label);
                self.mailbox.send_replace(Some(reading.clone()));
                Some(reading)
            }
            Err(err) => {
                log::debug!("Dropping frame: {}", err);
                None
            }
        }
    }

    pub fn receiver(&self) -> ReadingReceiver {
        ReadingReceiver {
            rx: self.mailbox.subscribe(),
        }
    }
}

/// Reader side of the mailbox.
#[derive(Debug, Clone)]
pub struct ReadingReceiver {
    rx: watch::Receiver<Option<Reading>>,
}

impl ReadingReceiver {
    /// Waits for the next reading decoded after this call.
    ///
    /// A reading published before the call is discarded, so the result is
    /// never older than the call itself.
    pub async fn wait_for_reading(&mut self, timeout: Duration) -> Result<Reading> {
        self.rx.borrow_and_update();

        loop {
            match tokio::time::timeout(timeout, self.rx.changed()).await {
                Ok(Ok(())) => {
                    if let Some(reading) = self.rx.borrow_and_update().clone() {
                        return Ok(reading);
                    }
                }
                Ok(Err(_)) => return Err(ProtoError::Abort),
                Err(_) => return Err(ProtoError::ReadTimeout(timeout)),
            }
        }
    }

    /// Last decoded reading, if any, without waiting.
    pub fn latest(&self) -> Option<Reading> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::frame::frame_with_payload;
    use std::time::Instant;

    fn voltage_frame(hi: u8, lo: u8) -> Frame {
        frame_with_payload([
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, hi, lo, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ])
    }

    #[test]
    fn decode_publishes() {
        let (decoder, rx) = PacketDecoder::new();
        assert!(rx.latest().is_none());

        let reading = decoder.decode(&voltage_frame(0x30, 0x39)).expect("reading");
        assert!((reading.value - 1.2345).abs() < 1e-9);
        assert_eq!(rx.latest(), Some(reading));
    }

    #[test]
    fn bad_checksum_is_dropped() {
        let (decoder, rx) = PacketDecoder::new();
        let mut data = *voltage_frame(0x30, 0x39).as_bytes();
        data[7] ^= 0x01;

        assert!(decoder.decode(&Frame::new(data)).is_none());
        assert!(rx.latest().is_none());
    }

    #[test]
    fn unknown_mode_is_dropped() {
        let (decoder, rx) = PacketDecoder::new();
        let frame = frame_with_payload([
            0x00, 0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00,
        ]);
        assert!(decoder.decode(&frame).is_none());
        assert!(rx.latest().is_none());
    }

    #[tokio::test]
    async fn latest_reading_wins() {
        let (decoder, mut rx) = PacketDecoder::new();

        let waiter =
            tokio::spawn(async move { rx.wait_for_reading(Duration::from_secs(2)).await });
        // let the waiter register before both frames arrive
        tokio::task::yield_now().await;

        decoder.decode(&voltage_frame(0x00, 0x01));
        decoder.decode(&voltage_frame(0x00, 0x02));

        let reading = waiter.await.expect("join").expect("reading");
        assert!((reading.value - 0.0002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn pending_reading_is_discarded() {
        let (decoder, mut rx) = PacketDecoder::new();
        decoder.decode(&voltage_frame(0x30, 0x39));

        let result = rx.wait_for_reading(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ProtoError::ReadTimeout(_))));
        drop(decoder);
    }

    #[tokio::test]
    async fn timeout_without_frames() {
        let (decoder, mut rx) = PacketDecoder::new();
        let window = Duration::from_millis(100);

        let start = Instant::now();
        let result = rx.wait_for_reading(window).await;
        assert!(start.elapsed() >= window);
        match result {
            Err(ProtoError::ReadTimeout(d)) => assert_eq!(d, window),
            other => panic!("Expected timeout, got {:?}", other),
        }
        drop(decoder);
    }

    #[tokio::test]
    async fn closed_producer_aborts() {
        let (decoder, mut rx) = PacketDecoder::new();
        drop(decoder);

        let result = rx.wait_for_reading(Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ProtoError::Abort)));
    }
}
