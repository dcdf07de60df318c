use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Action, BlockReason, Engine, EngineError, NewReservation, ProposedChange};
use crate::limits::MAX_LINE_BYTES;
use crate::model::*;
use crate::observability;

/// One request line. The `op` field selects the variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListRooms,
    GetRoom {
        room_id: Ulid,
    },
    ListHolidays,
    ListReservations {
        #[serde(default)]
        filter: ReservationFilter,
    },
    GetReservation {
        reservation_id: Ulid,
    },
    CheckAvailability {
        room_id: Ulid,
        #[serde(default)]
        connected_room_id: Option<Ulid>,
        start: Ts,
        end: Ts,
        #[serde(default)]
        excluding: Option<Ulid>,
    },
    CreateReservation {
        reservation: NewReservation,
        actor: Actor,
    },
    ProposeMove {
        reservation_id: Ulid,
        new_start: Ts,
        actor: Actor,
    },
    ApplyMove {
        change: ProposedChange,
        actor: Actor,
    },
    Transition {
        reservation_id: Ulid,
        action: Action,
        actor: Actor,
    },
    EditTitle {
        reservation_id: Ulid,
        title: String,
        actor: Actor,
    },
    DeleteReservation {
        reservation_id: Ulid,
        actor: Actor,
    },
    WeekGrid {
        room_id: Ulid,
        anchor: NaiveDate,
    },
    MonthGrid {
        anchor: NaiveDate,
    },
    FreeWindows {
        room_id: Ulid,
        #[serde(default)]
        use_connected: bool,
        date: NaiveDate,
    },
    RegisterRoom {
        room_id: Ulid,
        name: String,
        capacity: u32,
        actor: Actor,
    },
    PairRooms {
        a: Ulid,
        b: Ulid,
        actor: Actor,
    },
    SetMaintenance {
        room_id: Ulid,
        reason: String,
        start: Ts,
        end: Ts,
        actor: Actor,
    },
    ClearMaintenance {
        room_id: Ulid,
        actor: Actor,
    },
    RegisterHoliday {
        holiday_id: Ulid,
        date: NaiveDate,
        name: String,
        actor: Actor,
    },
    RemoveHoliday {
        holiday_id: Ulid,
        actor: Actor,
    },
    Watch {
        room_id: Ulid,
    },
}

impl Request {
    /// Metrics label.
    pub fn op(&self) -> &'static str {
        match self {
            Request::ListRooms => "list_rooms",
            Request::GetRoom { .. } => "get_room",
            Request::ListHolidays => "list_holidays",
            Request::ListReservations { .. } => "list_reservations",
            Request::GetReservation { .. } => "get_reservation",
            Request::CheckAvailability { .. } => "check_availability",
            Request::CreateReservation { .. } => "create_reservation",
            Request::ProposeMove { .. } => "propose_move",
            Request::ApplyMove { .. } => "apply_move",
            Request::Transition { .. } => "transition",
            Request::EditTitle { .. } => "edit_title",
            Request::DeleteReservation { .. } => "delete_reservation",
            Request::WeekGrid { .. } => "week_grid",
            Request::MonthGrid { .. } => "month_grid",
            Request::FreeWindows { .. } => "free_windows",
            Request::RegisterRoom { .. } => "register_room",
            Request::PairRooms { .. } => "pair_rooms",
            Request::SetMaintenance { .. } => "set_maintenance",
            Request::ClearMaintenance { .. } => "clear_maintenance",
            Request::RegisterHoliday { .. } => "register_holiday",
            Request::RemoveHoliday { .. } => "remove_holiday",
            Request::Watch { .. } => "watch",
        }
    }
}

/// Request-level failure: either the line itself was unusable, or the engine refused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    BadRequest(String),
    Engine(EngineError),
}

impl From<EngineError> for WireError {
    fn from(e: EngineError) -> Self {
        WireError::Engine(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<BlockReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    culprit: Option<Ulid>,
    message: String,
}

impl From<&WireError> for ErrorBody {
    fn from(e: &WireError) -> Self {
        match e {
            WireError::BadRequest(message) => ErrorBody {
                kind: "bad_request",
                reason: None,
                culprit: None,
                message: message.clone(),
            },
            WireError::Engine(err) => {
                let conflict = match err {
                    EngineError::Conflict(c) => Some(*c),
                    _ => None,
                };
                ErrorBody {
                    kind: err.kind(),
                    reason: conflict.map(|c| c.reason),
                    culprit: conflict.map(|c| c.culprit),
                    message: err.to_string(),
                }
            }
        }
    }
}

fn ok_line(data: Value) -> String {
    json!({ "ok": true, "data": data }).to_string()
}

fn error_line(e: &WireError) -> String {
    json!({ "ok": false, "error": ErrorBody::from(e) }).to_string()
}

fn to_data<T: Serialize>(value: T) -> Result<Value, WireError> {
    serde_json::to_value(value).map_err(|e| WireError::BadRequest(format!("unencodable response: {e}")))
}

/// Run one request against the engine. `watch` is connection state and is
/// handled by the session instead.
pub async fn dispatch(engine: &Engine, req: Request) -> Result<Value, WireError> {
    match req {
        Request::ListRooms => to_data(engine.list_rooms()),
        Request::GetRoom { room_id } => to_data(engine.get_room(room_id)?),
        Request::ListHolidays => to_data(engine.list_holidays()),
        Request::ListReservations { filter } => to_data(engine.list_reservations(&filter)?),
        Request::GetReservation { reservation_id } => to_data(engine.get_reservation(reservation_id)?),
        Request::CheckAvailability {
            room_id,
            connected_room_id,
            start,
            end,
            excluding,
        } => to_data(engine.check_availability(room_id, connected_room_id, start, end, excluding)?),
        Request::CreateReservation { reservation, actor } => {
            to_data(engine.create_reservation(reservation, &actor).await?)
        }
        Request::ProposeMove {
            reservation_id,
            new_start,
            actor,
        } => to_data(engine.propose_move(reservation_id, new_start, &actor).await?),
        Request::ApplyMove { change, actor } => to_data(engine.apply_move(change, &actor).await?),
        Request::Transition {
            reservation_id,
            action,
            actor,
        } => to_data(engine.transition(reservation_id, action, &actor).await?),
        Request::EditTitle {
            reservation_id,
            title,
            actor,
        } => to_data(engine.edit_title(reservation_id, title, &actor).await?),
        Request::DeleteReservation { reservation_id, actor } => {
            engine.delete_reservation(reservation_id, &actor).await?;
            Ok(Value::Null)
        }
        Request::WeekGrid { room_id, anchor } => to_data(engine.week_grid(room_id, anchor)?),
        Request::MonthGrid { anchor } => to_data(engine.month_grid(anchor)?),
        Request::FreeWindows {
            room_id,
            use_connected,
            date,
        } => to_data(engine.free_windows(room_id, use_connected, date)?),
        Request::RegisterRoom {
            room_id,
            name,
            capacity,
            actor,
        } => to_data(engine.register_room(room_id, name, capacity, &actor).await?),
        Request::PairRooms { a, b, actor } => to_data(engine.pair_rooms(a, b, &actor).await?),
        Request::SetMaintenance {
            room_id,
            reason,
            start,
            end,
            actor,
        } => to_data(engine.set_maintenance(room_id, reason, start, end, &actor).await?),
        Request::ClearMaintenance { room_id, actor } => {
            to_data(engine.clear_maintenance(room_id, &actor).await?)
        }
        Request::RegisterHoliday {
            holiday_id,
            date,
            name,
            actor,
        } => to_data(engine.register_holiday(holiday_id, date, name, &actor).await?),
        Request::RemoveHoliday { holiday_id, actor } => {
            engine.remove_holiday(holiday_id, &actor).await?;
            Ok(Value::Null)
        }
        Request::Watch { .. } => Err(WireError::BadRequest("watch requires a connection".into())),
    }
}

/// Per-connection state: the rooms being watched and the tasks forwarding
/// their events into `events_tx`.
struct Session {
    engine: Arc<Engine>,
    events_tx: mpsc::Sender<Event>,
    watched: HashSet<Ulid>,
    forwarders: JoinSet<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        metrics::gauge!(observability::WATCHERS_ACTIVE).decrement(self.watched.len() as f64);
    }
}

impl Session {
    fn watch(&mut self, room_id: Ulid) -> Result<Value, WireError> {
        self.engine.get_room(room_id)?;
        if !self.watched.insert(room_id) {
            return Ok(json!({ "room_id": room_id }));
        }
        let mut rx = self.engine.notify.subscribe(room_id);
        let tx = self.events_tx.clone();
        self.forwarders.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => warn!("watcher on {room_id} lagged, {n} events dropped"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        metrics::gauge!(observability::WATCHERS_ACTIVE).increment(1.0);
        Ok(json!({ "room_id": room_id }))
    }

    async fn handle_line(&mut self, line: &str) -> String {
        let start = std::time::Instant::now();
        let (op, result) = match serde_json::from_str::<Request>(line) {
            Err(e) => ("invalid", Err(WireError::BadRequest(e.to_string()))),
            Ok(Request::Watch { room_id }) => ("watch", self.watch(room_id)),
            Ok(req) => (req.op(), dispatch(&self.engine, req).await),
        };
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
            .record(start.elapsed().as_secs_f64());
        match result {
            Ok(data) => ok_line(data),
            Err(e) => {
                if let WireError::Engine(err) = &e
                    && err.is_fatal()
                {
                    tracing::error!("{op} failed: {err}");
                } else {
                    debug!("{op} rejected: {e:?}");
                }
                error_line(&e)
            }
        }
    }
}

/// Serve one client until it disconnects. Requests are answered in order;
/// watched events are interleaved between responses.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let (events_tx, mut events_rx) = mpsc::channel::<Event>(256);
    let mut session = Session {
        engine,
        events_tx,
        watched: HashSet::new(),
        forwarders: JoinSet::new(),
    };

    loop {
        tokio::select! {
            line = framed.next() => {
                let reply = match line {
                    None => break,
                    Some(Ok(line)) if line.trim().is_empty() => continue,
                    Some(Ok(line)) => session.handle_line(&line).await,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        error_line(&WireError::BadRequest("request line too long".into()))
                    }
                    Some(Err(e)) => return Err(e),
                };
                framed.send(reply).await?;
            }
            Some(event) = events_rx.recv() => {
                framed.send(json!({ "event": event }).to_string()).await?;
            }
        }
    }
    Ok(())
}
