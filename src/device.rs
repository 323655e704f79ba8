use btleplug::api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::{future, future::BoxFuture, Stream, StreamExt};
use std::{fmt, io, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::{codec::FramedRead, io::StreamReader};
use uuid::Uuid;

use crate::decoder::{PacketDecoder, ReadingReceiver};
use crate::measurement::Reading;
use crate::proto::{codec::FrameCodec, ProtoError, Result};
use crate::{DEFAULT_DEVICE_NAME, DEFAULT_READ_TIMEOUT, DEFAULT_SCAN_DURATION};

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0bd51666_e7cb_469b_8e4d_2742f1ba77cc);
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xe7add780_b042_4876_aae1_112855353cc1);

/// How to pick the meter among the advertising peripherals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Advertised local name contains this string.
    Name(String),
    Address(BDAddr),
}

impl ConnectTarget {
    fn matches(&self, dev: &DiscoveredDevice) -> bool {
        match self {
            Self::Name(name) => dev
                .name
                .as_deref()
                .map_or(false, |local| local.contains(name.as_str())),
            Self::Address(addr) => dev.address == *addr,
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{}'", name),
            Self::Address(addr) => write!(f, "{}", addr),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub target: ConnectTarget,
    pub scan_duration: Duration,
    pub read_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            target: ConnectTarget::Name(DEFAULT_DEVICE_NAME.to_string()),
            scan_duration: DEFAULT_SCAN_DURATION,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    pub fn by_address(address: BDAddr) -> Self {
        Self {
            target: ConnectTarget::Address(address),
            ..Default::default()
        }
    }

    pub fn by_name(name: impl AsRef<str>) -> Self {
        Self {
            target: ConnectTarget::Name(name.as_ref().to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: BDAddr,
    pub name: Option<String>,
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} {}", self.address, name),
            None => write!(f, "{} (unknown)", self.address),
        }
    }
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(ProtoError::NoAdapter)
}

async fn discover(
    adapter: &Adapter,
    duration: Duration,
) -> Result<Vec<(Peripheral, DiscoveredDevice)>> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;
    adapter.stop_scan().await?;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let name = peripheral
            .properties()
            .await?
            .and_then(|props| props.local_name);
        let dev = DiscoveredDevice {
            address: peripheral.address(),
            name,
        };
        log::debug!("Discovered {}", dev);
        found.push((peripheral, dev));
    }
    Ok(found)
}

/// Lists the peripherals advertising within `duration`.
pub async fn scan(duration: Duration) -> Result<Vec<DiscoveredDevice>> {
    let adapter = first_adapter().await?;
    Ok(discover(&adapter, duration)
        .await?
        .into_iter()
        .map(|(_, dev)| dev)
        .collect())
}

/// Feeds the raw notification chunks through the reassembler and decoder
/// until the stream ends.
async fn pump<S>(chunks: S, decoder: PacketDecoder)
where
    S: Stream<Item = Vec<u8>> + Send + 'static,
{
    let reader = StreamReader::new(Box::pin(
        chunks.map(|chunk| Ok::<_, io::Error>(Bytes::from(chunk))),
    ));
    let mut frames = FramedRead::new(reader, FrameCodec::default());

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                decoder.decode(&frame);
            }
            Err(err) => {
                log::warn!("Notification stream failed: {}", err);
                break;
            }
        }
    }
    log::debug!("Notification stream closed");
}

/// Subscribed connection to the meter, torn down by [`Device::close`] or
/// when the device is dropped.
pub(crate) trait Link: Send + Sync {
    fn is_connected(&self) -> BoxFuture<'_, Result<bool>>;
    fn unsubscribe(&self) -> BoxFuture<'_, Result<()>>;
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}

struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl Link for BleLink {
    fn is_connected(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.peripheral.is_connected().await?) })
    }

    fn unsubscribe(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(self.peripheral.unsubscribe(&self.characteristic).await?) })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(self.peripheral.disconnect().await?) })
    }
}

/// Unsubscribes and disconnects. Disconnecting is attempted even if
/// unsubscribing fails; the first error is returned.
async fn teardown(link: &dyn Link) -> Result<()> {
    let connected = match link.is_connected().await {
        Ok(connected) => connected,
        Err(err) => {
            log::warn!("Failed to query connection state: {}", err);
            true
        }
    };
    if !connected {
        return Ok(());
    }

    let unsubscribed = link.unsubscribe().await;
    if let Err(err) = &unsubscribed {
        log::warn!("Failed to unsubscribe: {}", err);
    }
    link.disconnect().await?;
    log::info!("Disconnected");
    unsubscribed
}

/// Connection to a 121GW meter.
///
/// The meter pushes a packet several times per second. Packets are decoded
/// in the background as they arrive; [`Device::reading`] waits for the next
/// one.
pub struct Device {
    link: Option<Box<dyn Link>>,
    readings: ReadingReceiver,
    read_timeout: Duration,
    pump: JoinHandle<()>,
}

impl Device {
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let adapter = first_adapter().await?;

        log::info!(
            "Scanning {:?} for {}",
            options.scan_duration,
            options.target
        );
        let (peripheral, dev) = discover(&adapter, options.scan_duration)
            .await?
            .into_iter()
            .find(|(_, dev)| options.target.matches(dev))
            .ok_or_else(|| ProtoError::DeviceNotFound(options.target.to_string()))?;

        log::info!("Connecting to {}", dev);
        peripheral
            .connect()
            .await
            .map_err(|err| ProtoError::ConnectFailed(format!("{}: {}", dev, err)))?;
        if !peripheral.is_connected().await? {
            return Err(ProtoError::ConnectFailed(dev.to_string()));
        }

        match Self::subscribe(peripheral.clone(), options.read_timeout).await {
            Ok(device) => {
                log::info!("Connected to {}", dev);
                Ok(device)
            }
            Err(err) => {
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    log::warn!("Failed to disconnect: {}", disconnect_err);
                }
                Err(err)
            }
        }
    }

    async fn subscribe(peripheral: Peripheral, read_timeout: Duration) -> Result<Self> {
        peripheral.discover_services().await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == CHARACTERISTIC_UUID && c.service_uuid == SERVICE_UUID)
            .ok_or(ProtoError::CharacteristicNotFound)?;

        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&characteristic).await?;

        let chunks = notifications
            .filter(|n| future::ready(n.uuid == CHARACTERISTIC_UUID))
            .map(|n| n.value);

        Ok(Self::with_notifications(
            chunks,
            Some(Box::new(BleLink {
                peripheral,
                characteristic,
            })),
            read_timeout,
        ))
    }

    fn with_notifications<S>(
        chunks: S,
        link: Option<Box<dyn Link>>,
        read_timeout: Duration,
    ) -> Self
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        let (decoder, readings) = PacketDecoder::new();
        Self {
            link,
            readings,
            read_timeout,
            pump: tokio::spawn(pump(chunks, decoder)),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_faked<S>(chunks: S) -> Self
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        Self::with_notifications(chunks, None, DEFAULT_READ_TIMEOUT)
    }

    #[cfg(test)]
    pub(crate) fn new_faked_with_link<S>(chunks: S, link: Box<dyn Link>) -> Self
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        Self::with_notifications(chunks, Some(link), DEFAULT_READ_TIMEOUT)
    }

    /// Next reading, waiting at most the configured read timeout.
    pub async fn reading(&mut self) -> Result<Reading> {
        let timeout = self.read_timeout;
        self.readings.wait_for_reading(timeout).await
    }

    pub async fn wait_for_reading(&mut self, timeout: Duration) -> Result<Reading> {
        self.readings.wait_for_reading(timeout).await
    }

    /// Last decoded reading without waiting.
    pub fn latest(&self) -> Option<Reading> {
        self.readings.latest()
    }

    /// Independent reader, e.g. for another task.
    pub fn readings(&self) -> ReadingReceiver {
        self.readings.clone()
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub async fn is_connected(&self) -> Result<bool> {
        match &self.link {
            Some(link) => link.is_connected().await,
            None => Ok(!self.pump.is_finished()),
        }
    }

    /// Unsubscribes and disconnects. Waiting readers get [`ProtoError::Abort`].
    ///
    /// On failure the link is kept, so `close` can be called again.
    pub async fn close(&mut self) -> Result<()> {
        self.pump.abort();
        if let Some(link) = self.link.take() {
            if let Err(err) = teardown(link.as_ref()).await {
                self.link = Some(link);
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.pump.abort();
        if let Some(link) = self.link.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = teardown(link.as_ref()).await {
                            log::warn!("Failed to close dropped device: {}", err);
                        }
                    });
                }
                Err(_) => log::warn!("Device dropped outside of a runtime, link left open"),
            }
        }
    }
}
