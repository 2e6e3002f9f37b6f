use roverlink::channel::ReaderExit;
use roverlink::instruction::*;
use roverlink::{ChannelConfig, InstructionChannel};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

async fn connect() -> (InstructionChannel, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ChannelConfig::default();
    let (channel, client) = tokio::join!(
        InstructionChannel::accept(&listener, &config),
        TcpStream::connect(addr)
    );
    (channel.unwrap(), client.unwrap())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

const MANUAL_1: &str = r#"{"ManualDriveInstruction":{"throttle":40,"steering":-5}}"#;
const MANUAL_2: &str = r#"{"ManualDriveInstruction":{"throttle":75.5,"steering":12}}"#;
const PARAMS: &str = r#"{"ParameterConfiguration":{"steering_kp":1.5,"steering_kd":0.2,"speed_kp":3,"speed_ki":0.01,"turn_kd":0.5,"angle_offset":-2}}"#;

#[tokio::test]
async fn test_getter_clears_pending_and_repeats_stale_value() {
    let (channel, mut client) = connect().await;
    client.write_all(format!("{}\n", MANUAL_1).as_bytes()).await.unwrap();

    wait_until(|| channel.new_manual_instruction()).await;
    assert!(channel.is_pending(InstructionKind::ManualDrive));

    let first = channel.manual_drive_instruction();
    assert_eq!(first, ManualDriveInstruction { throttle: 40.0, steering: -5.0 });
    assert!(!channel.new_manual_instruction());

    let second = channel.manual_drive_instruction();
    assert_eq!(second, first);
    assert!(!channel.new_manual_instruction());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_newer_frame_overwrites_unread_one() {
    let (channel, mut client) = connect().await;
    let burst = format!("{}\n{}\n{}\n", MANUAL_1, MANUAL_2, PARAMS);
    client.write_all(burst.as_bytes()).await.unwrap();

    // Frames are handled in order, so parameters arriving means both
    // manual frames have been stored.
    wait_until(|| channel.new_parameters()).await;
    assert!(channel.new_manual_instruction());
    assert_eq!(
        channel.manual_drive_instruction(),
        ManualDriveInstruction { throttle: 75.5, steering: 12.0 }
    );

    channel.shutdown().await;
}

#[tokio::test]
async fn test_stop_sets_emergency_without_losing_connection() {
    let (mut channel, mut client) = connect().await;
    client.write_all(b"STOP\n").await.unwrap();

    assert_eq!(channel.join().await, ReaderExit::EmergencyStop);
    assert!(channel.emergency_received());
    assert!(!channel.has_lost_connection());
    assert!(!channel.is_running());
}

#[tokio::test]
async fn test_stop_with_crlf() {
    let (mut channel, mut client) = connect().await;
    client.write_all(b"STOP\r\n").await.unwrap();

    assert_eq!(channel.join().await, ReaderExit::EmergencyStop);
    assert!(channel.emergency_received());
}

#[tokio::test]
async fn test_frames_after_stop_are_not_read() {
    let (mut channel, mut client) = connect().await;
    client
        .write_all(format!("STOP\n{}\n", MANUAL_1).as_bytes())
        .await
        .unwrap();

    assert_eq!(channel.join().await, ReaderExit::EmergencyStop);
    assert!(!channel.new_manual_instruction());
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let (channel, mut client) = connect().await;
    let burst = format!("this is not json\n{}\n", PARAMS);
    client.write_all(burst.as_bytes()).await.unwrap();

    wait_until(|| channel.new_parameters()).await;
    let params = channel.parameter_configuration();
    assert_eq!(params.steering_kp, 1.5);
    assert_eq!(params.speed_kp, 3.0);
    assert_eq!(params.angle_offset, -2.0);
    assert!(!channel.has_lost_connection());
    assert!(channel.is_running());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_wrong_field_types_are_skipped() {
    let (channel, mut client) = connect().await;
    let burst = format!(
        "{}\n{}\n",
        r#"{"ManualDriveInstruction":{"throttle":"fast"}}"#, PARAMS
    );
    client.write_all(burst.as_bytes()).await.unwrap();

    wait_until(|| channel.new_parameters()).await;
    assert!(!channel.new_manual_instruction());
    assert!(!channel.has_lost_connection());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_first_key_in_priority_order_wins() {
    let (channel, mut client) = connect().await;
    let frame = r#"{"MapData":{"nodes":[1,2]},"ManualDriveInstruction":{"throttle":10,"steering":0}}"#;
    client.write_all(format!("{}\n{}\n", frame, PARAMS).as_bytes()).await.unwrap();

    wait_until(|| channel.new_parameters()).await;
    assert!(channel.new_manual_instruction());
    assert!(!channel.new_map());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_map_keeps_whole_frame() {
    let (channel, mut client) = connect().await;
    client
        .write_all(b"{\"MapData\":{\"nodes\":[1,2,3]}}\n")
        .await
        .unwrap();

    wait_until(|| channel.new_map()).await;
    let map = channel.map();
    assert_eq!(map.0["MapData"]["nodes"][2], 3);
    assert!(!channel.new_map());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_semi_instruction_and_mission() {
    let (channel, mut client) = connect().await;
    let burst = concat!(
        r#"{"SemiDriveInstruction":{"direction":2,"id":"17"}}"#,
        "\n",
        r#"{"DriveMission":{"id":"m1","waypoints":[{"x":1,"y":2},{"x":3.5,"y":-1}]}}"#,
        "\n"
    );
    client.write_all(burst.as_bytes()).await.unwrap();

    wait_until(|| channel.new_drive_mission()).await;
    let semi = channel.semi_drive_instruction();
    assert_eq!(semi.direction, 2);
    assert_eq!(semi.id, "17");

    match channel.take(InstructionKind::DriveMission) {
        Instruction::DriveMission(mission) => {
            assert_eq!(mission.id, "m1");
            assert_eq!(mission.waypoints.len(), 2);
            assert_eq!(mission.waypoints[1], Waypoint { x: 3.5, y: -1.0 });
        }
        other => panic!("unexpected instruction {:?}", other),
    }
    assert!(!channel.new_drive_mission());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_peer_close_sets_lost_connection() {
    let (mut channel, client) = connect().await;
    drop(client);

    assert_eq!(channel.join().await, ReaderExit::ConnectionLost);
    assert!(channel.has_lost_connection());
    assert!(!channel.emergency_received());
}

#[tokio::test]
async fn test_shutdown_does_not_need_peer_data() {
    let (channel, _client) = connect().await;
    let exit = tokio::time::timeout(Duration::from_secs(5), channel.shutdown())
        .await
        .expect("shutdown should not hang on an idle peer");
    assert_eq!(exit, ReaderExit::Shutdown);
}

#[tokio::test]
async fn test_writers_produce_json_lines() {
    let (channel, client) = connect().await;
    let mut lines = BufReader::new(client).lines();

    channel.write("plain response").await.unwrap();
    channel.write_formatted("Info", "Parameters updated").await.unwrap();
    channel.send_instruction_id("42").await.unwrap();

    assert_eq!(lines.next_line().await.unwrap().unwrap(), "plain response");
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        r#"{"Info":"Parameters updated"}"#
    );
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        r#"{"InstructionId": "42"}"#
    );

    channel.shutdown().await;
}

#[tokio::test]
async fn test_categories_are_independent() {
    let (channel, mut client) = connect().await;
    client
        .write_all(format!("{}\n{}\n", MANUAL_1, PARAMS).as_bytes())
        .await
        .unwrap();

    wait_until(|| channel.new_parameters()).await;
    let _ = channel.parameter_configuration();
    assert!(!channel.new_parameters());
    assert!(channel.new_manual_instruction());

    channel.shutdown().await;
}
