#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::Write;

use scenepack::{
    Category, CategoryMask, ContainerIndex, FileKind, LoadOptions, MetadataKind, PackError,
    PackInspector, Payload, ResourceRecord, Scenepack, ShapeNode,
};

// --- HELPERS ---

/// Builds a session with an Object (named) and a Mesh (payload-bearing)
/// under the root.
fn build_session() -> scenepack::Result<scenepack::EncodeSession> {
    let mut session = scenepack::EncodeSession::new("scene")?;

    let object_id = session.generate_id()?;
    let mut object = ShapeNode::new(Category::Object, object_id).with_name("Hero");

    let mesh_id = session.generate_id()?;
    object.add_child(ShapeNode::new(Category::Mesh, mesh_id).with_name("HeroMesh"));
    session.add_resource(
        Category::Mesh,
        ResourceRecord::new(
            mesh_id,
            MetadataKind::Json,
            br#"{"vertices":3}"#.to_vec(),
            vec![7u8; 256],
        ),
    )?;

    session.attach(object);
    Ok(session)
}

// --- TESTS ---

/// Write then read back: shape structure, names, and payloads survive.
#[test]
fn test_round_trip_shape_and_payload() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scene.spk");

    let session = build_session()?;
    let mesh_id = session
        .root()
        .children[0]
        .children[0]
        .id;
    Scenepack::save(&path, FileKind::GameAsset, session)?;

    let pack = Scenepack::load(&path, &LoadOptions::default())?;
    assert_eq!(pack.header().file_kind, FileKind::GameAsset);

    let root = pack.shape_root().expect("node block missing");
    assert_eq!(root.category, Category::Root);
    assert_eq!(root.children.len(), 1);

    let object = &root.children[0];
    assert_eq!(object.category, Category::Object);
    // Object names are materialized on read.
    assert_eq!(object.name.as_deref(), Some("Hero"));
    // Root and Mesh names are framed but not read back.
    assert_eq!(root.name.as_deref(), Some("none"));
    assert_eq!(object.children[0].name.as_deref(), Some("none"));

    let record = pack
        .store()
        .get_resource(Category::Mesh, mesh_id)
        .expect("mesh record missing");
    assert_eq!(record.metadata_kind, MetadataKind::Json);
    assert_eq!(record.metadata, br#"{"vertices":3}"#.to_vec());
    assert_eq!(record.payload_bytes(None)?, vec![7u8; 256]);
    Ok(())
}

/// The index lists one entry per written block, node block first.
#[test]
fn test_index_matches_layout() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("indexed.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    let pack = Scenepack::load(&path, &LoadOptions::default())?;
    let index = pack.index().expect("index block missing");
    assert_eq!(index.entries().len(), 1 + pack.store().block_count());

    let node_offset = index.offset_of(Category::Node).expect("node entry missing");
    let expected = scenepack::container::HEADER_LEN
        + ContainerIndex::block_len(index.entries().len());
    assert_eq!(node_offset as usize, expected);
    Ok(())
}

/// Streamed loading leaves payloads on disk; materializing them through
/// the mapped file yields the same bytes as an in-memory load.
#[test]
fn test_streaming_equivalence() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("streamed.spk");

    let session = build_session()?;
    let mesh_id = session.root().children[0].children[0].id;
    Scenepack::save(&path, FileKind::GameAsset, session)?;

    let inline = Scenepack::load(&path, &LoadOptions::default())?;
    let inline_bytes = inline
        .store()
        .get_resource(Category::Mesh, mesh_id)
        .expect("mesh record missing")
        .payload_bytes(None)?;

    let streamed = Scenepack::load(
        &path,
        &LoadOptions {
            stream_payloads: true,
            ..LoadOptions::default()
        },
    )?;
    let record = streamed
        .store()
        .get_resource(Category::Mesh, mesh_id)
        .expect("mesh record missing");
    assert!(matches!(record.payload, Payload::Streamed(_)));

    let source = streamed.payload_source()?;
    assert_eq!(record.payload_bytes(Some(&source))?, inline_bytes);
    Ok(())
}

/// A record flagged streamed at write time stays on disk under a default
/// load, but assembly mode pulls it into memory anyway.
#[test]
fn test_record_streamed_flag_and_assembly_override() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("flagged.spk");

    let mut session = scenepack::EncodeSession::new("scene")?;
    let audio_id = session.generate_id()?;
    session.attach(ShapeNode::new(Category::Audio, audio_id));
    session.add_resource(
        Category::Audio,
        ResourceRecord::new(audio_id, MetadataKind::None, Vec::new(), vec![3u8; 64]).streamed(),
    )?;
    Scenepack::save(&path, FileKind::SoundAsset, session)?;

    let pack = Scenepack::load(&path, &LoadOptions::default())?;
    let record = pack
        .store()
        .get_resource(Category::Audio, audio_id)
        .expect("audio record missing");
    assert!(record.streamed);
    assert!(matches!(record.payload, Payload::Streamed(_)));

    let assembled = Scenepack::load(
        &path,
        &LoadOptions {
            assembly: true,
            ..LoadOptions::default()
        },
    )?;
    let record = assembled
        .store()
        .get_resource(Category::Audio, audio_id)
        .expect("audio record missing");
    assert_eq!(record.payload_bytes(None)?, vec![3u8; 64]);
    Ok(())
}

/// Masked categories are skipped in the store but the shape tree is
/// untouched.
#[test]
fn test_masked_block_is_skipped() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("masked.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    let pack = Scenepack::load(
        &path,
        &LoadOptions {
            mask: CategoryMask::ALL.without(Category::Mesh),
            ..LoadOptions::default()
        },
    )?;

    assert!(pack.store().block(Category::Mesh).is_none());
    let root = pack.shape_root().expect("node block missing");
    // Mesh node still present structurally.
    assert_eq!(root.count(), 3);
    assert_eq!(root.children[0].children[0].category, Category::Mesh);
    Ok(())
}

/// A trailing block with an unknown kind is skipped, not fatal.
#[test]
fn test_unknown_block_kind_is_skipped() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("extra.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(&4u32.to_le_bytes())?;
    file.write_all(&99u32.to_le_bytes())?;
    drop(file);

    let pack = Scenepack::load(&path, &LoadOptions::default())?;
    assert!(pack.shape_root().is_some());
    Ok(())
}

/// A resource block with an unknown category tag is skipped.
#[test]
fn test_unknown_category_block_is_skipped() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("alien.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    // A resource block whose category bit is outside the known set.
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(&8u32.to_le_bytes())?;
    file.write_all(&0u32.to_le_bytes())?;
    file.write_all(&(1u32 << 30).to_le_bytes())?;
    drop(file);

    let pack = Scenepack::load(&path, &LoadOptions::default())?;
    assert!(pack.shape_root().is_some());
    Ok(())
}

/// The metadata mask selects schema categories at compile time and
/// behaves like any other mask at run time.
#[test]
fn test_metadata_mask_selects_schema_categories() {
    const MASK: CategoryMask = CategoryMask::METADATA;
    assert!(MASK.contains(Category::Class));
    assert!(MASK.contains(Category::Pointer));
    assert!(MASK.contains(Category::Collection));
    assert!(!MASK.contains(Category::Mesh));
    assert!(!MASK.contains(Category::Audio));
    assert!(MASK.with(Category::Mesh).contains(Category::Mesh));
}

/// A node declaring an absurd child count fails on the bytes it cannot
/// back instead of allocating for the declaration.
#[test]
fn test_hostile_child_count_fails_cleanly() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("hostile.spk");

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u32.to_le_bytes()); // version
    bytes.extend_from_slice(&24u32.to_le_bytes()); // body length
    bytes.extend_from_slice(&0u32.to_le_bytes()); // file kind
    bytes.extend_from_slice(&20u32.to_le_bytes()); // node block chunk
    bytes.extend_from_slice(&2u32.to_le_bytes()); // block kind: node
    bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // child count
    bytes.extend_from_slice(&Category::Root.bit().to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes()); // id
    bytes.extend_from_slice(&0u32.to_le_bytes()); // name length
    std::fs::write(&path, &bytes)?;

    let err = Scenepack::load(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        PackError::TruncatedChunk { .. } | PackError::CorruptContainer(_)
    ));
    Ok(())
}

/// A record frame declaring more bytes than its block holds is rejected
/// before anything is read or allocated for it.
#[test]
fn test_record_overrunning_block_rejected() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("overrun.spk");

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u32.to_le_bytes()); // version
    bytes.extend_from_slice(&20u32.to_le_bytes()); // body length
    bytes.extend_from_slice(&0u32.to_le_bytes()); // file kind
    bytes.extend_from_slice(&16u32.to_le_bytes()); // resource block chunk
    bytes.extend_from_slice(&0u32.to_le_bytes()); // block kind: resource
    bytes.extend_from_slice(&Category::Mesh.bit().to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes()); // object count
    bytes.extend_from_slice(&0xFFFF_FF00u32.to_le_bytes()); // record length
    std::fs::write(&path, &bytes)?;

    let err = Scenepack::load(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, PackError::CorruptContainer(_)));
    Ok(())
}

/// Truncating the file mid-payload is a hard error.
#[test]
fn test_truncated_file_fails() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cut.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    let file = OpenOptions::new().write(true).open(&path)?;
    let len = file.metadata()?.len();
    file.set_len(len - 5)?;
    drop(file);

    let err = Scenepack::load(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        PackError::TruncatedChunk { .. } | PackError::CorruptContainer(_)
    ));
    Ok(())
}

/// A header with the wrong format version is rejected.
#[test]
fn test_wrong_version_is_rejected() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("versioned.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    let mut file = OpenOptions::new().write(true).open(&path)?;
    file.write_all(&999u32.to_le_bytes())?;
    drop(file);

    let err = Scenepack::load(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, PackError::CorruptContainer(_)));
    Ok(())
}

/// Adding two records with the same ID to one category is refused.
#[test]
fn test_duplicate_resource_id_rejected() -> scenepack::Result<()> {
    let mut session = scenepack::EncodeSession::new("scene")?;
    let id = session.generate_id()?;

    session.add_resource(
        Category::Mesh,
        ResourceRecord::new(id, MetadataKind::None, Vec::new(), vec![1]),
    )?;
    let err = session
        .add_resource(
            Category::Mesh,
            ResourceRecord::new(id, MetadataKind::None, Vec::new(), vec![2]),
        )
        .unwrap_err();
    assert!(matches!(err, PackError::Internal(_)));

    // Explicit replacement is the supported path.
    session.replace_resource(
        Category::Mesh,
        ResourceRecord::new(id, MetadataKind::None, Vec::new(), vec![2]),
    )?;
    assert_eq!(
        session
            .store()
            .get_resource(Category::Mesh, id)
            .expect("record missing")
            .payload_bytes(None)?,
        vec![2]
    );
    Ok(())
}

/// The inspector produces a report without touching payload bytes.
#[test]
fn test_inspector_report() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("inspect.spk");

    Scenepack::save(&path, FileKind::GameAsset, build_session()?)?;

    let report = PackInspector::inspect(&path)?;
    assert_eq!(report.tree.children.len(), 1);
    assert_eq!(report.tree.children[0].children[0].payload_size, 256);

    let rendered = report.to_string();
    assert!(rendered.contains("[SHAPE TREE]"));
    assert!(rendered.contains("Object"));
    Ok(())
}

/// Inspecting and rendering a deeply nested tree works; the walks are
/// heap-bounded, not call-stack-bounded.
#[test]
fn test_inspector_handles_deep_trees() -> scenepack::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("deep.spk");
    let depth = 2_000;

    let mut session = scenepack::EncodeSession::new("deep")?;
    let mut node = ShapeNode::new(Category::Object, session.generate_id()?).with_name("leaf");
    for _ in 1..depth {
        let mut parent =
            ShapeNode::new(Category::Object, session.generate_id()?).with_name("layer");
        parent.add_child(node);
        node = parent;
    }
    session.attach(node);
    Scenepack::save(&path, FileKind::GameAsset, session)?;

    let report = PackInspector::inspect(&path)?;
    let mut chain = 0;
    let mut current = &report.tree;
    while let Some(child) = current.children.first() {
        chain += 1;
        current = child;
    }
    assert_eq!(chain, depth);

    let rendered = report.to_string();
    assert!(rendered.lines().count() > depth);
    assert!(rendered.contains("\"leaf\""));
    Ok(())
}
