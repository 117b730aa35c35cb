//! ESP-NOW radio driver.
//!
//! Wi-Fi is started in station mode without connecting, pinned to the
//! configured channel, and ESP-NOW frames are handed from the driver's
//! receive callback to [`Radio::recv`] through a bounded channel.

use super::{Frame, LinkError, PeerAddress, Radio};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::espnow::{EspNow, PeerInfo, ReceiveInfo};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::{self as sys, esp};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Frames buffered between the receive callback and `recv`.
const RX_QUEUE_DEPTH: usize = 16;

pub struct EspNowRadio {
    wifi: Option<EspWifi<'static>>,
    espnow: Option<EspNow<'static>>,
    rx: Receiver<Frame>,
}

impl EspNowRadio {
    /// Bring up Wi-Fi on `channel` and attach ESP-NOW.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        channel: u8,
    ) -> Result<Self, LinkError> {
        let mut wifi = EspWifi::new(modem, sysloop, nvs)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            channel: Some(channel),
            ..Default::default()
        }))?;
        wifi.start()?;
        esp!(unsafe {
            sys::esp_wifi_set_channel(channel, sys::wifi_second_chan_t_WIFI_SECOND_CHAN_NONE)
        })?;

        let mac = wifi.sta_netif().get_mac()?;
        info!(
            "ESP-NOW on channel {}, local address {}",
            channel,
            PeerAddress::new(mac)
        );

        let espnow = EspNow::take()?;
        let (tx, rx) = mpsc::sync_channel(RX_QUEUE_DEPTH);
        espnow.register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
            let frame = Frame {
                src: PeerAddress::new(*info.src_addr),
                data: data.to_vec(),
            };
            // Drop rather than block the Wi-Fi task when the queue is full
            if tx.try_send(frame).is_err() {
                warn!("ESP-NOW receive queue full, frame dropped");
            }
        })?;

        Ok(Self {
            wifi: Some(wifi),
            espnow: Some(espnow),
            rx,
        })
    }

    fn espnow(&self) -> Result<&EspNow<'static>, LinkError> {
        self.espnow.as_ref().ok_or(LinkError::Closed)
    }
}

impl Radio for EspNowRadio {
    fn add_peer(&mut self, addr: PeerAddress) -> Result<(), LinkError> {
        let espnow = self.espnow()?;
        if espnow.peer_exists(addr.octets())? {
            return Ok(());
        }
        let peer = PeerInfo {
            peer_addr: addr.octets(),
            channel: 0,
            ifidx: sys::wifi_interface_t_WIFI_IF_STA,
            encrypt: false,
            ..Default::default()
        };
        espnow.add_peer(peer)?;
        debug!("ESP-NOW peer added: {}", addr);
        Ok(())
    }

    fn send(&mut self, addr: PeerAddress, data: &[u8]) -> Result<(), LinkError> {
        self.espnow()?.send(addr.octets(), data)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, LinkError> {
        match timeout {
            Some(Duration::ZERO) => match self.rx.try_recv() {
                Ok(frame) => Ok(Some(frame)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(LinkError::Closed),
            },
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(frame) => Ok(Some(frame)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
            },
            None => self.rx.recv().map(Some).map_err(|_| LinkError::Closed),
        }
    }

    fn shutdown(&mut self) -> Result<(), LinkError> {
        if let Some(espnow) = self.espnow.take() {
            espnow.unregister_recv_cb()?;
            drop(espnow);
        }
        if let Some(mut wifi) = self.wifi.take() {
            wifi.stop()?;
        }
        info!("ESP-NOW released");
        Ok(())
    }
}
