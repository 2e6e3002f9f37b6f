use roverlink::instruction::*;

#[test]
fn test_parse_manual_instruction() {
    let frame = br#"{"ManualDriveInstruction":{"throttle":50,"steering":-20}}"#;
    let inst = Instruction::from_frame(frame).unwrap().unwrap();
    assert_eq!(inst.kind(), InstructionKind::ManualDrive);
    assert_eq!(
        inst,
        Instruction::ManualDrive(ManualDriveInstruction { throttle: 50.0, steering: -20.0 })
    );
}

#[test]
fn test_missing_fields_default() {
    let frame = br#"{"ParameterConfiguration":{"speed_kp":2.0}}"#;
    let Some(Instruction::Parameters(params)) = Instruction::from_frame(frame).unwrap() else {
        panic!("expected parameters");
    };
    assert_eq!(params.speed_kp, 2.0);
    assert_eq!(params.steering_kp, 0.0);
}

#[test]
fn test_priority_order() {
    assert_eq!(InstructionKind::ALL[0].key(), "ManualDriveInstruction");
    assert_eq!(InstructionKind::ALL[4].key(), "MapData");

    let frame = br#"{"ParameterConfiguration":{},"DriveMission":{"id":"x"}}"#;
    let inst = Instruction::from_frame(frame).unwrap().unwrap();
    assert_eq!(inst.kind(), InstructionKind::DriveMission);
}

#[test]
fn test_unrecognised_frames() {
    assert!(Instruction::from_frame(br#"{"Telemetry":{}}"#).unwrap().is_none());
    assert!(Instruction::from_frame(b"42").unwrap().is_none());
    assert!(Instruction::from_frame(b"\"MapData\"").unwrap().is_none());
}

#[test]
fn test_malformed_frames_are_recoverable() {
    for frame in [
        &b"not json"[..],
        &b""[..],
        &b"{\"ManualDriveInstruction\":"[..],
        &b"{\"SemiDriveInstruction\":{\"direction\":\"left\"}}"[..],
        &b"{\"ManualDriveInstruction\":null}"[..],
        &[0xFF, 0xFE, 0x7B][..],
    ] {
        let err = Instruction::from_frame(frame).unwrap_err();
        assert!(err.is_recoverable(), "{:?} should be recoverable", err);
    }
}

#[test]
fn test_fatal_error_is_not_recoverable() {
    let err = FrameError::Fatal("stream corrupted".to_string());
    assert!(!err.is_recoverable());
    assert_eq!(err.to_string(), "fatal frame error: stream corrupted");
}
