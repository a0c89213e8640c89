use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use channel_mesh::{
    features::{CrossSection, MeshElement, Vertex},
    io::GeoJsonStore,
    store::read_features,
};
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;

fn read<F: channel_mesh::store::Feature>(path: &Path) -> Vec<F> {
    let (store, name) = GeoJsonStore::for_file(path).unwrap();
    read_features(&store, &name).unwrap()
}

fn line_feature(section_id: u32, coords: &str) -> String {
    format!(
        r#"{{"type":"Feature","geometry":{{"type":"LineString","coordinates":{coords}}},"properties":{{"SECTIONID":{section_id}}}}}"#
    )
}

fn collection(features: &[String]) -> String {
    format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
}

#[test]
fn connect_cross_sections_command() {
    let dir = assert_fs::TempDir::new().unwrap();
    let points = dir.child("points.csv");
    points
        .write_str("1,20.0,0.0,1.0,QP1\n2,0.0,0.0,0.5,QP1\n3,20.0,50.0,1.0,QP2\n4,0.0,50.0,0.4,QP2\n")
        .unwrap();
    let output = dir.child("sections.geojson");

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "connect-cross-sections",
            points.path().to_str().unwrap(),
            output.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    output.assert(predicate::path::exists());
    let sections: Vec<CrossSection> = read(output.path());
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[1].key.section_id, 2);
    assert!((sections[1].line.start().unwrap().x - 50.0).abs() < 1e-9);
}

#[test]
fn flip_numeration_command() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dir.child("sections.geojson");
    input
        .write_str(&collection(&[
            line_feature(1, "[[0,20],[0,0]]"),
            line_feature(2, "[[50,20],[50,0]]"),
            line_feature(3, "[[100,20],[100,0]]"),
        ]))
        .unwrap();
    let output = dir.child("flipped.geojson");

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "flip-numeration",
            input.path().to_str().unwrap(),
            output.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    let ids: Vec<u32> = read::<CrossSection>(output.path()).iter().map(|s| s.key.section_id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[test]
fn flip_direction_command() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dir.child("sections.geojson");
    input
        .write_str(&collection(&[
            line_feature(1, "[[0,20],[0,0]]"),
            line_feature(2, "[[50,0],[50,20]]"),
        ]))
        .unwrap();
    let wlb = dir.child("wlb.geojson");
    wlb.write_str(
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-10,20],[110,20]]},"properties":{"WLBID":1}},
            {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-10,0],[110,0]]},"properties":{"WLBID":2}}]}"#,
    )
    .unwrap();
    let output = dir.child("flipped.geojson");

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "flip-direction",
            input.path().to_str().unwrap(),
            wlb.path().to_str().unwrap(),
            output.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    let sections: Vec<CrossSection> = read(output.path());
    assert!(sections.iter().all(|s| (s.line.start().unwrap().y - 20.0).abs() < 1e-9));
}

#[test]
fn check_elements_command() {
    let dir = assert_fs::TempDir::new().unwrap();
    let elements = dir.child("elements.geojson");
    let square = |id: u32, x: f64| {
        format!(
            r#"{{"type":"Feature","geometry":{{"type":"Polygon","coordinates":[[[{x},0,1],[{x2},0,1],[{x2},4,1],[{x},4,1],[{x},0,1]]]}},"properties":{{"SECTIONID":1,"INTERMEDIATEID":0,"ELEMENTID":{id}}}}}"#,
            x2 = x + 4.0
        )
    };
    elements
        .write_str(&collection(&[square(1, 0.0), square(2, 4.0)]))
        .unwrap();
    let report = dir.child("report.txt");

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "check-elements",
            elements.path().to_str().unwrap(),
            report.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 violations in 2 elements"));

    report.assert(predicate::str::contains("Element count: 2"));
    let read_back: Vec<MeshElement> = read(elements.path());
    assert_eq!(read_back.len(), 2);
}

fn cross_line_feature(section_id: u32, intermediate_id: u32, x: f64) -> String {
    format!(
        r#"{{"type":"Feature","geometry":{{"type":"LineString","coordinates":[[{x},20],[{x},0]]}},"properties":{{"SECTIONID":{section_id},"INTERMEDIATEID":{intermediate_id}}}}}"#
    )
}

#[test]
fn mesh_counts_elements_from_bounded_sections() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.child("config.json");
    config.write_str(r#"{"element_count_method": "VARIABLE"}"#).unwrap();
    // 20 m wide rows: length classes 15..25 give 8 elements per row. Classes
    // built from 28 m surveyed sections would give only 5.
    let cross_lines = dir.child("cross_lines.geojson");
    cross_lines
        .write_str(&collection(&[
            cross_line_feature(1, 0, 0.0),
            cross_line_feature(1, 1, 25.0),
            cross_line_feature(2, 0, 50.0),
        ]))
        .unwrap();
    let terrain = dir.child("terrain.xyz");
    terrain
        .write_str("-10 -10 1.0\n60 -10 1.0\n60 30 1.0\n-10 30 1.0\n")
        .unwrap();
    let vertices = dir.child("vertices.geojson");
    let elements = dir.child("elements.geojson");

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "mesh",
            cross_lines.path().to_str().unwrap(),
            terrain.path().to_str().unwrap(),
            vertices.path().to_str().unwrap(),
            elements.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    let vertices: Vec<Vertex> = read(vertices.path());
    assert_eq!(vertices.len(), 27);
    assert!(vertices.iter().all(|v| (v.point.z - 1.0).abs() < 1e-6));
    let elements: Vec<MeshElement> = read(elements.path());
    assert_eq!(elements.len(), 16);
}

#[test]
fn existing_output_is_kept_without_overwrite() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dir.child("sections.geojson");
    input
        .write_str(&collection(&[line_feature(1, "[[0,20],[0,0]]"), line_feature(2, "[[50,20],[50,0]]")]))
        .unwrap();
    let output = dir.child("flipped.geojson");
    output.write_str(&collection(&[line_feature(7, "[[0,0],[1,0]]")])).unwrap();

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "flip-numeration",
            input.path().to_str().unwrap(),
            output.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("flipped_"));
    let kept: Vec<CrossSection> = read(output.path());
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].key.section_id, 7);

    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "--overwrite",
            "flip-numeration",
            input.path().to_str().unwrap(),
            output.path().to_str().unwrap(),
        ])
        .assert()
        .success();
    assert_eq!(read::<CrossSection>(output.path()).len(), 2);
}

#[test]
fn missing_input_fails() {
    let dir = assert_fs::TempDir::new().unwrap();
    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args([
            "flip-numeration",
            dir.child("absent.geojson").path().to_str().unwrap(),
            dir.child("out.geojson").path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn unknown_point_format_is_rejected() {
    Command::cargo_bin("channel_mesh_cli")
        .unwrap()
        .args(["connect-cross-sections", "points.csv", "out.geojson", "--format", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown point file format"));
}
