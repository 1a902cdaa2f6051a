//! This module contains the ISO8583 TCP client session: sign-on, heartbeat,
//! sequence numbering and asynchronous request/response correlation over one
//! shared connection.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::Local;

use crate::iso8583::framing;
use crate::iso8583::iso_msg::{IsoMsg, MessageKey, ISO_RSP_SUCCESS};
use crate::iso8583::iso_spec::Spec;
use crate::iso8583::packager::StringPackager;
use crate::iso8583::IsoError;

/// Read deadline for the synchronous sign-on exchange and the echo-test wait.
const NETWORK_MGMT_DEADLINE: Duration = Duration::from_secs(5);

/// Heartbeat failures tolerated before the session is torn down.
const MAX_TICKER: u32 = 3;

/// How recent the last receive must be for [IsoClient::is_valid].
const LIVENESS_WINDOW: Duration = Duration::from_secs(60);

/// A request waiting for its response.
///
/// Inserted into the correlation table before the request is written;
/// removed when the matching response is delivered, or right away when the
/// write fails. An entry whose waiter gave up is never swept.
pub struct Payload {
    pub request: IsoMsg,
    pub response: SyncSender<IsoMsg>,
    pub timestamp: Instant,
}

/// An ISO8583 TCP client session.
///
/// The session owns the connection, the packager and the correlation table.
/// Exactly one [IsoClient::receive] may run at a time; sends may run
/// concurrently with an in-flight receive but are serialized among
/// themselves. Both disciplines are enforced by internal locks, so the
/// session is shared as an [Arc] - the heartbeat task holds its own clone.
pub struct IsoClient {
    id: String,
    timeout: Duration,
    stream: TcpStream,
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
    packager: StringPackager,
    queue: Mutex<HashMap<MessageKey, Payload>>,
    stan: Mutex<u32>,
    signed_on: AtomicBool,
    ticker: AtomicU32,
    outgoing: AtomicU64,
    incoming: AtomicU64,
    last_send: Mutex<SystemTime>,
    last_receive: Mutex<SystemTime>,
}

impl IsoClient {
    /// Opens the connection and seeds the sequence counter from the current
    /// time's HHMMSS digits (not guaranteed unique across rapid restarts).
    pub fn connect(
        address: &str,
        port: u16,
        timeout: Duration,
        spec: Arc<Spec>,
    ) -> Result<Arc<IsoClient>, IsoError> {
        let url = format!("{}:{}", address, port);
        info!("connecting to iso8583 server @ {}", url);

        let stream = TcpStream::connect((address, port))?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);

        let seed = Local::now()
            .format("%H%M%S")
            .to_string()
            .parse::<u32>()
            .unwrap_or(0);

        let now = SystemTime::now();
        Ok(Arc::new(IsoClient {
            id: format!("iso@{}", std::process::id()),
            timeout,
            stream,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            packager: StringPackager::new(spec),
            queue: Mutex::new(HashMap::new()),
            stan: Mutex::new(seed),
            signed_on: AtomicBool::new(false),
            ticker: AtomicU32::new(0),
            outgoing: AtomicU64::new(0),
            incoming: AtomicU64::new(0),
            last_send: Mutex::new(now),
            last_receive: Mutex::new(now),
        }))
    }

    /// Performs the sign-on handshake, synchronously awaiting exactly one
    /// response on this call - the general correlation table is bypassed.
    pub fn sign_on(&self) -> Result<(), IsoError> {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0800");
        msg.set_bit(7, &Local::now().format("%m%d%H%M%S").to_string());
        msg.set_bit(11, "1");
        msg.set_bit(70, "001");

        info!("sign-on request: {}", msg);

        self.stream.set_read_timeout(Some(NETWORK_MGMT_DEADLINE))?;

        let payload = self.packager.pack(&msg)?;
        {
            let mut writer = self.writer.lock().unwrap();
            framing::write_frame(&mut *writer, payload.as_bytes())?;
        }

        let body = {
            let mut reader = self.reader.lock().unwrap();
            framing::read_frame(&mut *reader)?
        };
        let resp = self
            .packager
            .unpack(&body)?
            .ok_or_else(|| IsoError::Protocol("incomplete sign-on response".to_string()))?;

        info!("sign-on response: {}", resp);

        if resp.resp_code()? != ISO_RSP_SUCCESS {
            return Err(IsoError::Protocol(
                "received failed response for sign-on".to_string(),
            ));
        }

        let now = SystemTime::now();
        *self.last_send.lock().unwrap() = now;
        *self.last_receive.lock().unwrap() = now;
        self.signed_on.store(true, Ordering::SeqCst);

        info!("sign-on successful");
        Ok(())
    }

    /// Fires an echo test on its own thread and returns its handle.
    ///
    /// The heartbeat submits a network-management message through the
    /// general send path with a dedicated response slot and waits up to the
    /// network-management deadline. On timeout or a failed response code it
    /// clears the signed-on flag - the socket stays open and nothing is
    /// reported back to the caller.
    pub fn echo_test(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let client = Arc::clone(self);
        thread::spawn(move || {
            if let Err(e) = client.run_echo_test() {
                error!("echo test failed on {}: {}", client.id, e);
                client.signed_on.store(false, Ordering::SeqCst);
            }
        })
    }

    fn run_echo_test(&self) -> Result<(), IsoError> {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0800");
        msg.set_bit(7, &Local::now().format("%m%d%H%M%S").to_string());
        msg.set_bit(70, "301");

        let (inbox, outbox) = sync_channel(1);
        self.send(&mut msg, Some(inbox))?;

        let resp = outbox
            .recv_timeout(NETWORK_MGMT_DEADLINE)
            .map_err(|_| IsoError::Timeout)?;
        debug!("echo response: {}", resp);

        if resp.resp_code()? != ISO_RSP_SUCCESS {
            return Err(IsoError::Protocol(
                "received failed response for echo-test".to_string(),
            ));
        }
        Ok(())
    }

    /// Assigns the next sequence number to field 11 and writes the message.
    ///
    /// When a response slot is supplied the pending entry is inserted before
    /// the write and rolled back if the write fails. The slot must have a
    /// one-item buffer or an already-attached consumer - the receive path
    /// will not wait for it.
    pub fn send(&self, msg: &mut IsoMsg, response: Option<SyncSender<IsoMsg>>) -> Result<(), IsoError> {
        msg.set_bit(11, &self.get_stan().to_string());
        let key = msg.message_key();

        if let Some(response) = response {
            debug!("push request {} to correlation queue", key);
            self.queue.lock().unwrap().insert(
                key.clone(),
                Payload {
                    request: msg.clone(),
                    response,
                    timestamp: Instant::now(),
                },
            );
        }

        info!("submit request {}: {}", key, msg);

        let written = self.packager.pack(msg).and_then(|payload| {
            let mut writer = self.writer.lock().unwrap();
            framing::write_frame(&mut *writer, payload.as_bytes())
        });

        if let Err(e) = written {
            self.queue.lock().unwrap().remove(&key);
            return Err(e);
        }

        *self.last_send.lock().unwrap() = SystemTime::now();
        self.outgoing.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    /// Reads and unpacks exactly one frame, honoring the configured read
    /// timeout, and routes it to the matching pending request.
    ///
    /// A response nobody is waiting for is dropped silently; an incomplete
    /// message is discarded. Delivery never blocks on a slow consumer.
    pub fn receive(&self) -> Result<(), IsoError> {
        self.stream.set_read_timeout(Some(self.timeout))?;

        let body = {
            let mut reader = self.reader.lock().unwrap();
            framing::read_frame(&mut *reader)?
        };

        let resp = match self.packager.unpack(&body)? {
            Some(resp) => resp,
            None => {
                warn!("discarding incomplete message of {} bytes", body.len());
                return Ok(());
            }
        };

        *self.last_receive.lock().unwrap() = SystemTime::now();
        self.incoming.fetch_add(1, Ordering::SeqCst);

        let key = resp.message_key();
        info!("received response {}: {}", key, resp);

        let mut queue = self.queue.lock().unwrap();
        match queue.remove(&key) {
            Some(payload) => {
                if let Err(e) = payload.response.try_send(resp) {
                    warn!("dropping response for {}: slot unavailable ({})", key, e);
                }
            }
            None => debug!("no pending request for {}, dropping response", key),
        }

        Ok(())
    }

    /// Returns the next sequence number in [1, 999999]; 999999 wraps to 1
    /// and 0 is never returned.
    pub fn get_stan(&self) -> u32 {
        let mut stan = self.stan.lock().unwrap();
        if *stan >= 999_999 {
            *stan = 1;
        } else {
            *stan += 1;
        }
        *stan
    }

    /// Counts a heartbeat failure; the third one tears the session down
    /// without closing the socket.
    pub fn add_ticker(&self) {
        let ticker = self.ticker.fetch_add(1, Ordering::SeqCst) + 1;
        if ticker >= MAX_TICKER {
            warn!("{} heartbeat failures on {}, tearing down", ticker, self.id);
            self.tear_down();
        }
    }

    /// Clears the signed-on flag only; the socket stays open.
    pub fn tear_down(&self) {
        self.signed_on.store(false, Ordering::SeqCst);
    }

    /// Closes the socket only; compose with [IsoClient::tear_down] as needed.
    pub fn disconnect(&self) -> Result<(), IsoError> {
        self.stream.shutdown(Shutdown::Both)?;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signed_on(&self) -> bool {
        self.signed_on.load(Ordering::SeqCst)
    }

    /// Signed on and received something within the liveness window.
    pub fn is_valid(&self) -> bool {
        let last = *self.last_receive.lock().unwrap();
        self.signed_on()
            && last
                .elapsed()
                .map(|age| age < LIVENESS_WINDOW)
                .unwrap_or(true)
    }

    pub fn last_send(&self) -> SystemTime {
        *self.last_send.lock().unwrap()
    }

    pub fn last_receive(&self) -> SystemTime {
        *self.last_receive.lock().unwrap()
    }

    pub fn outgoing(&self) -> u64 {
        self.outgoing.load(Ordering::SeqCst)
    }

    pub fn incoming(&self) -> u64 {
        self.incoming.load(Ordering::SeqCst)
    }

    /// Number of requests still awaiting a response.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}
