use convergence_control::pinger::Pinger;
use convergence_control::protocol::envelope;
use convergence_control::protocol::Envelope;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn first_ping_is_delayed_by_one_full_interval() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pinger = Pinger::start(tx, Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(rx.try_recv().is_err());

    tokio::time::advance(Duration::from_secs(2)).await;
    let frame = rx.recv().await.expect("ping should have been sent");
    match envelope::parse(frame).unwrap() {
        Envelope::Request { command, ask, .. } => {
            assert_eq!(command, "NoOp");
            assert_eq!(ask, None);
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
    pinger.stop();
}

#[tokio::test(start_paused = true)]
async fn pings_keep_arriving_on_schedule() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pinger = Pinger::start(tx, Duration::from_secs(5));
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.recv().await.is_some());
    }
    pinger.stop();
}
