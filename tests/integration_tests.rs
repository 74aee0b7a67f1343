//! Integration tests for the trivia duel server and client
//!
//! These tests run a real server on a loopback port and drive it with real
//! clients or raw framed sockets.

use client::input::AutoPlayer;
use client::network::{Client, ClientOptions};
use server::config::{ServerConfig, SessionConfig};
use server::network::Server;
use server::questions::QuestionBank;
use server::rating::EloRating;
use server::recorder::{MemoryRecorder, ResultRecorder};
use server::session::SessionDeps;
use shared::codec::{read_frame, write_frame};
use shared::{
    ClientEvent, ErrorKind, GameMode, MatchRequest, PlayerId, ServerEvent, Winner,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

/// Unshuffled bank where choice 0 is always correct.
fn test_bank(count: usize, time_limit_ms: u64) -> QuestionBank {
    let entries: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"category":"Test","difficulty":"easy","question":"Question {}","correct_answer":"right","incorrect_answers":["w1","w2","w3"],"time_limit_ms":{}}}"#,
                i, time_limit_ms
            )
        })
        .collect();
    let json = format!("[{}]", entries.join(","));
    QuestionBank::from_json(&json, Duration::from_millis(time_limit_ms))
        .unwrap()
        .with_shuffle(false)
}

async fn start_server(
    session: SessionConfig,
    bank: QuestionBank,
) -> (SocketAddr, Arc<MemoryRecorder>) {
    let recorder = Arc::new(MemoryRecorder::new());
    let deps = SessionDeps {
        source: Arc::new(bank),
        recorder: recorder.clone(),
        rating: Arc::new(EloRating::default()),
    };
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        session,
        ..ServerConfig::default()
    };

    let server = Server::new(config, deps).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    (addr, recorder)
}

fn quick_session(question_count: usize) -> SessionConfig {
    SessionConfig {
        question_count,
        round_gap: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

fn auto_options(player_id: PlayerId, request: MatchRequest) -> ClientOptions {
    let mut options = ClientOptions::new(player_id, format!("bot-{}", player_id), request);
    options.auto = Some(AutoPlayer::new(
        Duration::from_millis(10),
        Duration::from_millis(40),
    ));
    options
}

fn hello(player_id: PlayerId, request: MatchRequest) -> ClientEvent {
    ClientEvent::Hello {
        client_version: PROTOCOL_VERSION,
        player_id,
        name: format!("p{}", player_id),
        rating: None,
        request,
    }
}

async fn send(stream: &mut TcpStream, event: &ClientEvent) {
    write_frame(stream, event).await.unwrap();
}

/// Next server event, skipping opponent-answered notices.
async fn recv(stream: &mut TcpStream) -> Option<ServerEvent> {
    loop {
        let event = timeout(Duration::from_secs(5), read_frame(stream))
            .await
            .expect("Timed out waiting for the server")
            .unwrap();
        match event {
            Some(ServerEvent::OpponentAnswered { .. }) => continue,
            other => return other,
        }
    }
}

async fn expect_question(stream: &mut TcpStream, round: usize) -> u64 {
    match recv(stream).await {
        Some(ServerEvent::QuestionIssued {
            round_index,
            time_limit_ms,
            ..
        }) => {
            assert_eq!(round_index, round);
            time_limit_ms
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

/// END-TO-END GAMES WITH REAL CLIENTS
mod game_tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn training_game_with_auto_client() {
        let (addr, recorder) = start_server(quick_session(3), test_bank(5, 2_000)).await;

        let client = assert_ok!(
            Client::connect(&addr.to_string(), auto_options(11, MatchRequest::Training)).await
        );
        let outcome = assert_ok!(client.run().await);

        let finish = outcome.finish.expect("training game did not finish");
        assert_eq!(finish.winner, Winner::Player(11));
        assert_eq!(finish.rating_delta, None);
        assert!(outcome.final_score <= 300);
        assert_eq!(outcome.final_score % 100, 0);

        let results = recorder.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].mode, GameMode::Training);
        assert_eq!(Some(results[0].session_id), outcome.session_id);
        assert_eq!(results[0].rounds.len(), 3);
    }

    #[tokio::test]
    async fn ranked_duel_between_two_clients() {
        let (addr, recorder) = start_server(quick_session(3), test_bank(5, 2_000)).await;
        let addr = addr.to_string();

        let first = Client::connect(&addr, auto_options(21, MatchRequest::Ranked))
            .await
            .unwrap();
        let second = Client::connect(&addr, auto_options(22, MatchRequest::Ranked))
            .await
            .unwrap();

        let (a, b) = tokio::join!(first.run(), second.run());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.session_id.is_some());
        assert_eq!(a.session_id, b.session_id);

        let (fa, fb) = (a.finish.unwrap(), b.finish.unwrap());
        assert_eq!(fa.final_scores, fb.final_scores);
        assert_eq!(fa.winner, fb.winner);

        let (da, db) = (fa.rating_delta.unwrap(), fb.rating_delta.unwrap());
        assert_eq!(da + db, 0);
        match fa.winner {
            Winner::Player(21) => assert_eq!(da, 16),
            Winner::Player(22) => assert_eq!(db, 16),
            Winner::Draw => assert_eq!(da, 0),
            other => panic!("Unexpected winner: {:?}", other),
        }

        let rankings = recorder.rankings().await;
        assert_eq!(rankings.len(), 2);
        assert_eq!(recorder.rating_of(21).await, Some(1000 + da));
        assert_eq!(recorder.history(22).await.len(), 1);
    }

    #[tokio::test]
    async fn invite_duel_is_unranked() {
        let (addr, recorder) = start_server(quick_session(2), test_bank(3, 2_000)).await;
        let addr = addr.to_string();
        let invite = || MatchRequest::Direct {
            invite_token: "friday-quiz".to_string(),
        };

        let host = Client::connect(&addr, auto_options(31, invite())).await.unwrap();
        let guest = Client::connect(&addr, auto_options(32, invite())).await.unwrap();
        let (host, guest) = tokio::join!(host.run(), guest.run());
        let (host, guest) = (host.unwrap(), guest.unwrap());

        assert_eq!(host.session_id, guest.session_id);
        assert_eq!(host.finish.unwrap().rating_delta, None);
        assert_eq!(guest.finish.unwrap().rating_delta, None);

        let results = recorder.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].mode, GameMode::Unranked);
        assert!(results[0].rating_deltas.is_empty());
        assert!(recorder.rankings().await.is_empty());
    }
}

/// PROTOCOL AND CONNECTION HANDLING
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let (addr, _) = start_server(quick_session(1), test_bank(1, 2_000)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        send(
            &mut stream,
            &ClientEvent::Hello {
                client_version: 0,
                player_id: 1,
                name: "legacy".into(),
                rating: None,
                request: MatchRequest::Training,
            },
        )
        .await;

        assert_eq!(
            recv(&mut stream).await,
            Some(ServerEvent::Error {
                kind: ErrorKind::UnsupportedVersion
            })
        );
        assert_eq!(recv(&mut stream).await, None);
    }

    #[tokio::test]
    async fn player_cannot_queue_twice() {
        let (addr, _) = start_server(quick_session(1), test_bank(1, 2_000)).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        send(&mut first, &hello(5, MatchRequest::Ranked)).await;
        assert_eq!(
            recv(&mut first).await,
            Some(ServerEvent::Queued {
                mode: GameMode::Ranked
            })
        );

        let mut second = TcpStream::connect(addr).await.unwrap();
        send(
            &mut second,
            &hello(
                5,
                MatchRequest::Direct {
                    invite_token: "x".into(),
                },
            ),
        )
        .await;
        assert_eq!(
            recv(&mut second).await,
            Some(ServerEvent::Error {
                kind: ErrorKind::AlreadyQueued
            })
        );
        assert_eq!(recv(&mut second).await, None);
    }

    #[tokio::test]
    async fn undecodable_frame_is_answered_and_skipped() {
        let (addr, _) = start_server(quick_session(1), test_bank(1, 5_000)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        send(&mut stream, &hello(8, MatchRequest::Training)).await;
        assert!(matches!(
            recv(&mut stream).await,
            Some(ServerEvent::MatchFound { .. })
        ));
        expect_question(&mut stream, 0).await;

        // A frame whose variant tag matches no client event
        let garbage = bincode::serialize(&250u32).unwrap();
        stream.write_u32(garbage.len() as u32).await.unwrap();
        stream.write_all(&garbage).await.unwrap();

        assert_eq!(
            recv(&mut stream).await,
            Some(ServerEvent::Error {
                kind: ErrorKind::InvalidEvent
            })
        );

        send(
            &mut stream,
            &ClientEvent::Answer {
                question_index: 0,
                choice_index: 0,
            },
        )
        .await;
        assert!(matches!(
            recv(&mut stream).await,
            Some(ServerEvent::RoundResult {
                points_awarded: 100,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn dropped_player_resumes_session() {
        let (addr, recorder) = start_server(quick_session(2), test_bank(2, 5_000)).await;
        let invite = || MatchRequest::Direct {
            invite_token: "rejoin".to_string(),
        };

        let mut a = TcpStream::connect(addr).await.unwrap();
        send(&mut a, &hello(41, invite())).await;
        assert_eq!(
            recv(&mut a).await,
            Some(ServerEvent::Queued {
                mode: GameMode::Unranked
            })
        );

        let mut b = TcpStream::connect(addr).await.unwrap();
        send(&mut b, &hello(42, invite())).await;

        let session_id = match recv(&mut a).await {
            Some(ServerEvent::MatchFound { session_id, .. }) => session_id,
            other => panic!("Unexpected event: {:?}", other),
        };
        assert!(matches!(
            recv(&mut b).await,
            Some(ServerEvent::MatchFound { .. })
        ));
        expect_question(&mut a, 0).await;
        expect_question(&mut b, 0).await;

        drop(a);
        sleep(Duration::from_millis(200)).await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        send(
            &mut a,
            &ClientEvent::Resume {
                client_version: PROTOCOL_VERSION,
                player_id: 41,
                session_id,
            },
        )
        .await;

        match recv(&mut a).await {
            Some(ServerEvent::Resumed { round_index, .. }) => assert_eq!(round_index, 0),
            other => panic!("Unexpected event: {:?}", other),
        }
        let remaining = expect_question(&mut a, 0).await;
        assert!(remaining <= 5_000);

        for round in 0..2 {
            if round > 0 {
                expect_question(&mut a, round).await;
                expect_question(&mut b, round).await;
            }
            for stream in [&mut a, &mut b] {
                send(
                    stream,
                    &ClientEvent::Answer {
                        question_index: round,
                        choice_index: 0,
                    },
                )
                .await;
            }
            for stream in [&mut a, &mut b] {
                assert!(matches!(
                    recv(stream).await,
                    Some(ServerEvent::RoundResult {
                        points_awarded: 100,
                        ..
                    })
                ));
            }
        }

        match recv(&mut a).await {
            Some(ServerEvent::SessionEnded { winner, .. }) => assert_eq!(winner, Winner::Draw),
            other => panic!("Unexpected event: {:?}", other),
        }

        let results = recorder.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score_of(41), Some(200));
    }
}
