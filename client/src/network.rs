use crate::game::{Finish, GameView};
use crate::input::{parse_command, AutoPlayer, InputManager};
use crate::rendering::Renderer;
use log::{debug, error, info, warn};
use shared::codec::{read_frame, write_frame};
use shared::{
    ClientEvent, ErrorKind, MatchRequest, PlayerId, ServerEvent, SessionId, PROTOCOL_VERSION,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: Option<i32>,
    pub request: MatchRequest,
    /// Rejoin this session instead of asking for a new match
    pub resume: Option<SessionId>,
    pub auto: Option<AutoPlayer>,
    /// Read commands from stdin
    pub interactive: bool,
    /// Print rendered events to stdout
    pub echo: bool,
}

impl ClientOptions {
    pub fn new(player_id: PlayerId, name: impl Into<String>, request: MatchRequest) -> Self {
        Self {
            player_id,
            name: name.into(),
            rating: None,
            request,
            resume: None,
            auto: None,
            interactive: false,
            echo: false,
        }
    }
}

/// How a client's stay on the server ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOutcome {
    pub session_id: Option<SessionId>,
    pub finish: Option<Finish>,
    pub last_error: Option<ErrorKind>,
    pub final_score: u32,
}

impl From<&GameView> for ClientOutcome {
    fn from(view: &GameView) -> Self {
        Self {
            session_id: view.session_id,
            finish: view.finish.clone(),
            last_error: view.last_error,
            final_score: view.my_score(),
        }
    }
}

enum Step {
    Server(Option<ServerEvent>),
    Line(Option<String>),
    AutoAnswer,
}

pub struct Client {
    options: ClientOptions,
    writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    view: GameView,
    input: InputManager,
    renderer: Renderer,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        options: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", server_addr);

        let (reader, writer) = stream.into_split();
        let events = Self::spawn_network_receiver(reader);

        Ok(Client {
            view: GameView::new(options.player_id),
            renderer: Renderer::new(options.player_id),
            input: InputManager::new(),
            options,
            writer,
            events,
        })
    }

    /// Spawns task that decodes server frames into a channel
    fn spawn_network_receiver(mut reader: OwnedReadHalf) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match read_frame::<_, ServerEvent>(&mut reader).await {
                    Ok(Some(event)) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Server closed the connection");
                        break;
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!("Skipping undecodable frame: {}", e);
                    }
                    Err(e) => {
                        error!("Error receiving from server: {}", e);
                        break;
                    }
                }
            }
        });

        rx
    }

    /// Spawns task that forwards stdin lines
    fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        rx
    }

    async fn send(&mut self, event: &ClientEvent) -> Result<(), Box<dyn std::error::Error>> {
        write_frame(&mut self.writer, event).await?;
        Ok(())
    }

    fn show(&self, text: &str) {
        if self.options.echo {
            println!("{}", text);
        }
    }

    fn handshake(&self) -> ClientEvent {
        match self.options.resume {
            Some(session_id) => ClientEvent::Resume {
                client_version: PROTOCOL_VERSION,
                player_id: self.options.player_id,
                session_id,
            },
            None => ClientEvent::Hello {
                client_version: PROTOCOL_VERSION,
                player_id: self.options.player_id,
                name: self.options.name.clone(),
                rating: self.options.rating,
                request: self.options.request.clone(),
            },
        }
    }

    /// Plays until the session ends, the server closes the connection or the
    /// player leaves.
    pub async fn run(mut self) -> Result<ClientOutcome, Box<dyn std::error::Error>> {
        let hello = self.handshake();
        self.send(&hello).await?;

        let mut stdin = if self.options.interactive {
            Some(Self::spawn_stdin_reader())
        } else {
            None
        };
        let mut auto_at: Option<Instant> = None;

        loop {
            let reading_stdin = stdin.is_some();
            let auto_deadline = auto_at;

            let step = tokio::select! {
                event = self.events.recv() => Step::Server(event),
                line = async {
                    match stdin.as_mut() {
                        Some(lines) => lines.recv().await,
                        None => None,
                    }
                }, if reading_stdin => Step::Line(line),
                _ = sleep_until(auto_deadline.unwrap_or_else(Instant::now)), if auto_deadline.is_some() => Step::AutoAnswer,
            };

            match step {
                Step::Server(Some(event)) => {
                    self.view.apply(&event);
                    let text = self.renderer.render(&event, &self.view);
                    self.show(&text);

                    match &event {
                        ServerEvent::MatchFound { session_id, .. } => {
                            info!("Session {}: rejoin with --resume {}", session_id, session_id);
                        }
                        ServerEvent::QuestionIssued { .. } => {
                            auto_at = self.options.auto.map(|auto| Instant::now() + auto.think_time());
                        }
                        _ => {}
                    }

                    if self.view.is_over() {
                        break;
                    }
                }

                Step::Server(None) => {
                    info!("Disconnected from server");
                    break;
                }

                Step::Line(Some(line)) => {
                    let command = match parse_command(&line) {
                        Some(command) => command,
                        None => {
                            self.show("Unknown command (type ? for help)");
                            continue;
                        }
                    };

                    match self.input.event_for(command, &self.view) {
                        Ok(event) => {
                            self.send(&event).await?;
                            match event {
                                ClientEvent::Answer { choice_index, .. } => {
                                    self.view.mark_answered(choice_index)
                                }
                                ClientEvent::Leave => break,
                                _ => {}
                            }
                        }
                        Err(reason) => self.show(reason),
                    }
                }

                Step::Line(None) => {
                    debug!("stdin closed");
                    stdin = None;
                }

                Step::AutoAnswer => {
                    auto_at = None;
                    let choice = self.options.auto.and_then(|auto| auto.pick(&self.view));
                    let round = self.view.question.as_ref().map(|q| q.round_index);
                    if let (Some(choice), Some(question_index)) = (choice, round) {
                        let event = ClientEvent::Answer {
                            question_index,
                            choice_index: choice,
                        };
                        self.send(&event).await?;
                        self.view.mark_answered(choice);
                    }
                }
            }
        }

        Ok(ClientOutcome::from(&self.view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PlayerScore, Winner};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    async fn scripted_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_auto_client_plays_scripted_session() {
        let (listener, addr) = scripted_server().await;
        let session_id = SessionId::new_v4();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let hello: Option<ClientEvent> = read_frame(&mut stream).await.unwrap();
            assert!(matches!(
                hello,
                Some(ClientEvent::Hello {
                    player_id: 3,
                    request: MatchRequest::Training,
                    ..
                })
            ));

            let script = [
                ServerEvent::MatchFound {
                    session_id,
                    mode: shared::GameMode::Training,
                    opponent_name: None,
                },
                ServerEvent::QuestionIssued {
                    round_index: 0,
                    text: "Pick one".into(),
                    choices: vec!["left".into(), "right".into()],
                    time_limit_ms: 5_000,
                },
            ];
            for event in &script {
                write_frame(&mut stream, event).await.unwrap();
            }

            let answer: Option<ClientEvent> = read_frame(&mut stream).await.unwrap();
            let choice = match answer {
                Some(ClientEvent::Answer {
                    question_index: 0,
                    choice_index,
                }) => choice_index,
                other => panic!("Unexpected event: {:?}", other),
            };
            assert!(choice < 2);

            let scores = vec![PlayerScore {
                player_id: 3,
                name: "cli".into(),
                score: 100,
            }];
            write_frame(
                &mut stream,
                &ServerEvent::SessionEnded {
                    final_scores: scores,
                    winner: Winner::Player(3),
                    rating_delta: None,
                },
            )
            .await
            .unwrap();
        });

        let mut options = ClientOptions::new(3, "cli", MatchRequest::Training);
        options.auto = Some(AutoPlayer::new(
            Duration::from_millis(1),
            Duration::from_millis(5),
        ));
        let client = assert_ok!(Client::connect(&addr, options).await);
        let outcome = assert_ok!(client.run().await);
        server.await.unwrap();

        assert_eq!(outcome.session_id, Some(session_id));
        assert_eq!(outcome.final_score, 100);
        assert_eq!(outcome.finish.unwrap().winner, Winner::Player(3));
    }

    #[tokio::test]
    async fn test_rejected_resume_ends_client() {
        let (listener, addr) = scripted_server().await;
        let session_id = SessionId::new_v4();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let resume: Option<ClientEvent> = read_frame(&mut stream).await.unwrap();
            assert_eq!(
                resume,
                Some(ClientEvent::Resume {
                    client_version: PROTOCOL_VERSION,
                    player_id: 9,
                    session_id,
                })
            );
            write_frame(
                &mut stream,
                &ServerEvent::Error {
                    kind: ErrorKind::RebindRejected,
                },
            )
            .await
            .unwrap();
        });

        let mut options = ClientOptions::new(9, "late", MatchRequest::Ranked);
        options.resume = Some(session_id);
        let client = assert_ok!(Client::connect(&addr, options).await);
        let outcome = assert_ok!(client.run().await);
        server.await.unwrap();

        assert_eq!(outcome.last_error, Some(ErrorKind::RebindRejected));
        assert!(outcome.finish.is_none());
    }
}
