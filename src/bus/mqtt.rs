// CLASSIFICATION: COMMUNITY
// Filename: mqtt.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! MQTT transport built on the synchronous `rumqttc` client.
//!
//! [`MqttBus`] is the cloneable request side handed to handlers and the
//! watchdog. [`MqttLink`] owns the connection and must be polled by the
//! network loop; requests are only written to the socket while it is polled.

use log::{debug, trace, warn};
use rumqttc::{
    Client, Connection, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS,
    RecvTimeoutError,
};
use std::time::Duration;

use super::{Bus, BusError, Delivery, Link, LinkEvent};
use crate::config::StationConfig;

const REQUEST_CAPACITY: usize = 64;

fn qos(delivery: Delivery) -> QoS {
    match delivery {
        Delivery::AtMostOnce => QoS::AtMostOnce,
        Delivery::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Request side of the broker connection.
#[derive(Clone)]
pub struct MqttBus {
    client: Client,
}

impl Bus for MqttBus {
    fn publish(&self, topic: &str, payload: &[u8], delivery: Delivery) -> Result<(), BusError> {
        trace!("publish {topic} ({} bytes)", payload.len());
        self.client
            .publish(topic, qos(delivery), false, payload.to_vec())?;
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        self.client.unsubscribe(topic)?;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BusError> {
        self.client.disconnect()?;
        Ok(())
    }
}

/// Connection side; drives network I/O when polled.
pub struct MqttLink {
    client: Client,
    connection: Connection,
}

impl MqttLink {
    /// Prepare a client for `station`. No I/O happens until the first poll.
    pub fn open(config: &StationConfig, station: &str) -> (MqttBus, MqttLink) {
        let client_id = format!("{}{station}", config.bus.client_id_prefix);
        let mut options = MqttOptions::new(client_id, config.bus.host.clone(), config.bus.port);
        options.set_keep_alive(config.keep_alive());
        debug!(
            "{station}: mqtt options {}:{} keep-alive {:?}",
            config.bus.host,
            config.bus.port,
            config.keep_alive()
        );
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let link = MqttLink {
            client: client.clone(),
            connection,
        };
        (MqttBus { client }, link)
    }
}

impl Link for MqttLink {
    fn poll(&mut self, timeout: Duration) -> Result<LinkEvent, BusError> {
        let event = match self.connection.recv_timeout(timeout) {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => return Err(BusError::Connection(e)),
            Err(RecvTimeoutError::Timeout) => return Ok(LinkEvent::Idle),
            Err(RecvTimeoutError::Disconnected) => return Ok(LinkEvent::Closed),
        };
        Ok(match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    LinkEvent::Connected
                } else {
                    warn!("broker refused connection: {:?}", ack.code);
                    LinkEvent::Refused(format!("{:?}", ack.code))
                }
            }
            Event::Incoming(Packet::Publish(publish)) => LinkEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Event::Outgoing(Outgoing::Disconnect) => LinkEvent::Closed,
            other => {
                trace!("mqtt event {other:?}");
                LinkEvent::Idle
            }
        })
    }

    fn subscribe(&self, topic: &str, delivery: Delivery) -> Result<(), BusError> {
        self.client.subscribe(topic, qos(delivery))?;
        Ok(())
    }
}
