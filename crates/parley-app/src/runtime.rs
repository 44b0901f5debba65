//! Generic runtime for application orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`Client`]: the synchronization engine
//! - [`Driver`]: platform-specific I/O
//!
//! Every client event is handled to completion, and every action it returns
//! executed, before the next event is taken. History fetches complete inside
//! that step, so their results are handled in order with everything else.

use std::collections::VecDeque;

use chrono::FixedOffset;
use parley_client::{
    Client, ClientAction, ClientConfig, ClientEvent, DeliveryStatus, Environment,
};

use crate::{ChatView, Driver, Intent, RuntimeError};

/// Notices kept for display.
const MAX_NOTICES: usize = 50;

/// Generic runtime that orchestrates Client and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    env: E,
    client: Client<E>,
    offset: FixedOffset,
    token: Option<String>,
    notices: VecDeque<String>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a runtime. `offset` is the viewer's local UTC offset.
    pub fn new(driver: D, env: E, config: ClientConfig, offset: FixedOffset) -> Self {
        let client = Client::new(env.clone(), config);
        Self { driver, env, client, offset, token: None, notices: VecDeque::new() }
    }

    /// Run the main event loop until a quit intent.
    ///
    /// Each cycle:
    /// 1. Polls the driver for a user intent
    /// 2. Receives a transport event
    /// 3. Ticks the client's timers
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to render or poll input.
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.render()?;

        while !self.step().await? {}

        if let Ok(actions) = self.client.handle(ClientEvent::Disconnect) {
            self.execute(actions).await?;
        }
        self.driver.stop();
        Ok(())
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to render or poll input.
    pub async fn step(&mut self) -> Result<bool, RuntimeError<D::Error>> {
        if let Some(intent) = self.driver.poll_intent().await.map_err(RuntimeError::Driver)?
            && self.apply_intent(intent).await?
        {
            return Ok(true);
        }

        if let Some(event) = self.driver.recv_transport().await {
            self.dispatch(ClientEvent::Transport(event)).await?;
        }

        let now = self.driver.now();
        self.dispatch(ClientEvent::Tick { now }).await?;

        Ok(false)
    }

    /// Apply an intent. Returns `true` on quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to render.
    pub async fn apply_intent(&mut self, intent: Intent) -> Result<bool, RuntimeError<D::Error>> {
        let event = match intent {
            Intent::Quit => return Ok(true),
            Intent::Connect { token } => {
                self.token = Some(token.clone());
                ClientEvent::Connect { token }
            },
            Intent::Reconnect => {
                let Some(token) = self.token.clone() else {
                    self.notice("no token to reconnect with".to_string());
                    self.render()?;
                    return Ok(false);
                };
                ClientEvent::Connect { token }
            },
            Intent::Disconnect => ClientEvent::Disconnect,
            Intent::SelectRoom(room) => ClientEvent::SelectRoom(room),
            Intent::Send(content) => ClientEvent::SendMessage { content },
            Intent::RetryFailed => {
                let failed: Vec<_> = self
                    .client
                    .messages()
                    .iter()
                    .filter(|m| m.status == DeliveryStatus::Failed)
                    .filter_map(|m| m.local_id)
                    .collect();
                for local_id in failed {
                    self.dispatch(ClientEvent::RetryMessage { local_id }).await?;
                }
                return Ok(false);
            },
            Intent::Edit { message_id, content } => ClientEvent::EditMessage { message_id, content },
            Intent::Delete { message_id } => ClientEvent::DeleteMessage { message_id },
            Intent::Keystroke => ClientEvent::Keystroke,
            Intent::InputClosed => ClientEvent::InputClosed,
        };

        self.dispatch(event).await?;
        Ok(false)
    }

    /// The synchronization engine.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Snapshot of the current state.
    pub fn view(&self) -> ChatView {
        ChatView::capture(
            &self.client,
            self.offset,
            self.env.wall_clock_millis(),
            self.notices.iter().cloned(),
        )
    }

    async fn dispatch(&mut self, event: ClientEvent<E::Instant>) -> Result<(), RuntimeError<D::Error>> {
        match self.client.handle(event) {
            Ok(actions) => self.execute(actions).await,
            Err(e) => {
                self.notice(e.to_string());
                self.render()
            },
        }
    }

    /// Execute client actions, feeding history results back in.
    async fn execute(&mut self, actions: Vec<ClientAction>) -> Result<(), RuntimeError<D::Error>> {
        let mut pending: VecDeque<ClientAction> = actions.into();
        let mut dirty = false;

        while let Some(action) = pending.pop_front() {
            match action {
                ClientAction::OpenTransport { transport } => {
                    self.driver.open_transport(transport).await;
                },
                ClientAction::DisposeTransport { transport } => {
                    self.driver.dispose_transport(transport);
                },
                ClientAction::Send(frame) => {
                    if let Err(e) = self.driver.send_frame(frame).await {
                        tracing::warn!(error = %e, "failed to send frame");
                    }
                },
                ClientAction::FetchHistory { room_id, epoch } => {
                    let event = match self.driver.fetch_history(room_id).await {
                        Ok(messages) => ClientEvent::HistoryLoaded { room_id, epoch, messages },
                        Err(e) => {
                            ClientEvent::HistoryFailed { room_id, epoch, reason: e.to_string() }
                        },
                    };
                    match self.client.handle(event) {
                        Ok(more) => pending.extend(more),
                        Err(e) => self.notice(e.to_string()),
                    }
                },
                ClientAction::ConnectionChanged(status) => {
                    tracing::info!(?status, "connection status changed");
                },
                ClientAction::ConnectionFailed { error } => {
                    self.notice(error.to_string());
                    dirty = true;
                },
                ClientAction::MessageFailed { local_id } => {
                    self.notice(format!("message {local_id} was not delivered, /retry to resend"));
                    dirty = true;
                },
                ClientAction::StateChanged => dirty = true,
                ClientAction::Log { message } => {
                    self.notice(message);
                    dirty = true;
                },
            }
        }

        if dirty {
            self.render()?;
        }
        Ok(())
    }

    fn notice(&mut self, message: String) {
        tracing::debug!(%message, "notice");
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(message);
    }

    fn render(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let view = self.view();
        self.driver.render(&view).map_err(RuntimeError::Driver)
    }
}
