//
// anonymization_workflows.rs
// dicom-veil
//
// Integration-style tests driving real DICOM bytes through intake, the dicom-rs codec, the orchestrator, and export.
//

use std::io::{Cursor, Read, Write};

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_veil::cli::{anonymize, ProfileArgs};
use dicom_veil::codec::{encode_payload, Codec, CodecAction, OperationType};
use dicom_veil::dicom_codec::DicomCodec;
use dicom_veil::dictionary::TagKey;
use dicom_veil::exporter::{Artifact, ExportOutcome, PackagingExporter};
use dicom_veil::intake::IncomingItem;
use dicom_veil::profile::{AnonymizationProfile, TokenGenerator};
use dicom_veil::registry::FileStatus;
use dicom_veil::session::Session;
use dicom_veil::storage::OutputDir;
use dicom_veil::VeilError;
use tempfile::tempdir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

fn build_test_dicom(patient_name: &str) -> Vec<u8> {
    // Tiny Secondary Capture instance carrying a handful of identifying attributes.
    let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    obj.put(DataElement::new(
        Tag(0x0010, 0x0010),
        VR::PN,
        PrimitiveValue::from(patient_name),
    ));
    obj.put(DataElement::new(
        Tag(0x0010, 0x0020),
        VR::LO,
        PrimitiveValue::from("PAT123"),
    ));
    obj.put(DataElement::new(
        Tag(0x0010, 0x0030),
        VR::DA,
        PrimitiveValue::from("19700101"),
    )); // Patient's Birth Date
    obj.put(DataElement::new(
        Tag(0x0010, 0x1040),
        VR::LO,
        PrimitiveValue::from("221B Baker Street"),
    )); // Patient's Address
    obj.put(DataElement::new(
        Tag(0x0008, 0x0020),
        VR::DA,
        PrimitiveValue::from("20240101"),
    )); // Study Date
    obj.put(DataElement::new(
        Tag(0x0008, 0x0060),
        VR::CS,
        PrimitiveValue::from("OT"),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0016),
        VR::UI,
        PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.7"),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0018),
        VR::UI,
        PrimitiveValue::from("1.2.826.0.1.3680043.2.1125.1"),
    ));

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
        .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1")
        .build()
        .expect("meta");

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj {
        file_obj.put(elem);
    }
    let mut bytes = Vec::new();
    file_obj.write_all(&mut bytes).expect("write test dicom");
    bytes
}

fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start entry");
        writer.write_all(bytes).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn value_of(bytes: &[u8], key: TagKey) -> Option<String> {
    DicomCodec::values(bytes, &[key]).expect("query")[0].value.clone()
}

fn session(seed: u64) -> Session<DicomCodec> {
    let mut profile = AnonymizationProfile::default();
    profile.set_override(TagKey::PatientName, Some("ANON^PATIENT".into()));
    profile.set_enabled(TagKey::StudyDate, false);

    Session::new(Codec::launch(DicomCodec::new()), PackagingExporter::new("batch-"))
        .with_profile(profile)
        .with_tokens(TokenGenerator::seeded(seed))
}

#[tokio::test]
async fn archive_upload_is_anonymized_and_exported_as_archive() {
    let mut session = session(1);
    let archive = zip_of(&[
        ("study/one.dcm", build_test_dicom("Doe^Jane")),
        ("study/two.dcm", build_test_dicom("Doe^John")),
    ]);
    let submission = session.submit(vec![
        IncomingItem::new("study.zip", Some("application/zip"), archive),
        IncomingItem::new("notes.txt", Some("text/plain"), b"hello".to_vec()),
    ]);
    assert_eq!(submission.accepted.len(), 2);
    assert_eq!(submission.rejected.len(), 1);

    let report = session.anonymize_pending().await.expect("anonymize");
    assert_eq!(report.anonymized, submission.accepted);
    assert!(!session.busy().is_busy());

    let record = session.registry().get(submission.accepted[0]).unwrap();
    let result = record.result_bytes().expect("result bytes");
    assert_eq!(
        value_of(result, TagKey::PatientName).as_deref(),
        Some("ANON^PATIENT")
    );
    assert_eq!(value_of(result, TagKey::PatientAddress), None);
    // Disabled in the profile: left untouched.
    assert_eq!(
        value_of(result, TagKey::StudyDate).as_deref(),
        Some("20240101")
    );
    let birth_date = value_of(result, TagKey::PatientBirthDate).expect("birth date");
    assert_ne!(birth_date, "19700101");
    assert!(!birth_date.is_empty());

    let dir = tempdir().expect("tempdir");
    let mut out = OutputDir::new(dir.path()).expect("output dir");
    let outcome = session.export_ready(&mut out).await.expect("export");
    let (name, entries) = match outcome {
        ExportOutcome::Archive { name, entries } => (name, entries),
        other => panic!("expected an archive, got {:?}", other),
    };
    assert!(name.starts_with("batch-") && name.ends_with(".zip"));
    assert_eq!(entries.len(), 2);

    let written = std::fs::read(&out.written()[0]).expect("read archive");
    let mut zip = ZipArchive::new(Cursor::new(written)).expect("open archive");
    let mut member = zip.by_name("study/two.dcm").expect("member");
    let mut content = Vec::new();
    member.read_to_end(&mut content).expect("read member");
    assert_eq!(
        value_of(&content, TagKey::PatientName).as_deref(),
        Some("ANON^PATIENT")
    );

    for id in &submission.accepted {
        assert_eq!(session.registry().status(*id), Some(FileStatus::Downloaded));
    }
}

#[tokio::test]
async fn single_file_export_keeps_original_name_and_other_elements() {
    let mut session = session(2);
    let submission = session.submit([IncomingItem::new("a.dcm", None, build_test_dicom("X^Y"))]);
    session.anonymize_pending().await.expect("anonymize");

    let dir = tempdir().expect("tempdir");
    let mut out = OutputDir::new(dir.path()).expect("output dir");
    let outcome = session.export_ready(&mut out).await.expect("export");
    assert_eq!(
        outcome,
        ExportOutcome::Single {
            id: submission.accepted[0],
            name: "a.dcm".into()
        }
    );

    let path = dir.path().join("a.dcm");
    assert_eq!(out.written(), &[path.clone()]);
    let anon = dicom::object::open_file(&path).expect("open anonymized file");
    let modality = anon
        .element(Tag(0x0008, 0x0060))
        .expect("modality")
        .to_str()
        .unwrap();
    assert_eq!(modality, "OT");
    assert!(anon.element(Tag(0x0010, 0x1040)).is_err());
}

#[tokio::test]
async fn corrupt_file_aborts_rest_of_batch() {
    let mut session = session(3);
    let submission = session.submit(vec![
        IncomingItem::new("a.dcm", None, build_test_dicom("A^A")),
        IncomingItem::new("b.dcm", None, b"not a dicom file".to_vec()),
        IncomingItem::new("c.dcm", None, build_test_dicom("C^C")),
    ]);
    let ids = submission.accepted;

    let err = session.anonymize(&ids).await.unwrap_err();
    assert!(matches!(err, VeilError::CodecFailure { ref name, .. } if name == "b.dcm"));
    assert_eq!(session.registry().status(ids[0]), Some(FileStatus::Anonymized));
    assert_eq!(session.registry().status(ids[1]), Some(FileStatus::Uploaded));
    assert_eq!(session.registry().status(ids[2]), Some(FileStatus::Uploaded));
    assert!(!session.busy().is_busy());

    // The completed file is still deliverable on its own.
    let mut sink: Vec<Artifact> = Vec::new();
    let outcome = session.export(&ids, &mut sink).await.expect("export");
    assert!(matches!(outcome, ExportOutcome::Single { id, .. } if id == ids[0]));
}

#[tokio::test]
async fn pinned_seed_reproduces_replacement_tokens() {
    let source = build_test_dicom("Same^Patient");
    let mut first = session(42);
    let mut second = session(42);
    let a = first.submit([IncomingItem::new("a.dcm", None, source.clone())]).accepted[0];
    let b = second.submit([IncomingItem::new("a.dcm", None, source)]).accepted[0];

    first.anonymize(&[a]).await.expect("first run");
    second.anonymize(&[b]).await.expect("second run");

    let first_values = first.query(a, &[TagKey::PatientID]).await.expect("query");
    let second_values = second.query(b, &[TagKey::PatientID]).await.expect("query");
    assert_eq!(first_values, second_values);
    assert_ne!(first_values[0].value.as_deref(), Some("PAT123"));
}

#[test]
fn flat_json_payload_drives_the_codec() {
    let source = build_test_dicom("Doe^Jane");
    let payload = encode_payload(&[
        CodecAction {
            group: 0x0010,
            element: 0x0010,
            operationtype: OperationType::Update,
            value: "mi gallo joe".into(),
        },
        CodecAction {
            group: 0x0010,
            element: 0x0030,
            operationtype: OperationType::Delete,
            value: String::new(),
        },
    ])
    .expect("payload");

    let result = DicomCodec::apply_payload(&source, &payload).expect("apply payload");
    assert_eq!(
        value_of(&result, TagKey::PatientName).as_deref(),
        Some("mi gallo joe")
    );
    assert_eq!(value_of(&result, TagKey::PatientBirthDate), None);
    assert_eq!(
        value_of(&result, TagKey::PatientID).as_deref(),
        Some("PAT123")
    );
}

#[tokio::test]
async fn fields_missing_from_the_source_are_not_added() {
    let mut session = session(4);
    let id = session
        .submit([IncomingItem::new("a.dcm", None, build_test_dicom("X^Y"))])
        .accepted[0];
    let absent = [TagKey::ContentCreatorName, TagKey::InstitutionName];

    let before = session.query(id, &absent).await.expect("query source");
    assert!(before.iter().all(|v| v.value.is_none()));

    session.anonymize(&[id]).await.expect("anonymize");

    let result = session.registry().get(id).unwrap().result_bytes().unwrap().to_vec();
    for key in absent {
        assert_eq!(value_of(&result, key), None, "{} was introduced", key);
    }
    // Present Dummy fields are still replaced.
    assert_eq!(
        value_of(&result, TagKey::PatientName).as_deref(),
        Some("ANON^PATIENT")
    );
}

#[tokio::test]
async fn aborted_cli_batch_still_writes_completed_files() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    std::fs::write(input.path().join("a.dcm"), build_test_dicom("A^A")).expect("write a");
    std::fs::write(input.path().join("b.dcm"), b"not a dicom file").expect("write b");

    let result = anonymize(
        &[input.path().to_path_buf()],
        Some(output.path().to_path_buf()),
        &ProfileArgs::default(),
    )
    .await;

    assert!(result.is_err());
    let written = output.path().join("a.dcm");
    assert!(written.exists());
    let bytes = std::fs::read(&written).expect("read output");
    assert_ne!(value_of(&bytes, TagKey::PatientName).as_deref(), Some("A^A"));
    assert!(!output.path().join("b.dcm").exists());
}
