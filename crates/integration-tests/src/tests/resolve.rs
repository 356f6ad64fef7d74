//! Integration tests for `vinst resolve`

use color_eyre::Result;
use integration_tests::integration_test;
use linkme::distributed_slice;

use crate::TestEnv;

fn test_resolve_local_path_is_normalized() -> Result<()> {
    let env = TestEnv::new()?;
    std::fs::create_dir(env.dir.join("sub"))?;
    std::fs::write(env.dir.join("media.iso"), b"iso")?;
    let messy = format!("{}/sub/../media.iso", env.dir);

    let output = env.run(&["resolve", &messy, "--json"])?;
    output.assert_success("resolve local path");
    let json = output.json()?;
    assert_eq!(json["location"], env.dir.join("media.iso").as_str());
    assert_eq!(json["kind"], "path");
    Ok(())
}
integration_test!(test_resolve_local_path_is_normalized);

fn test_resolve_http_tree() -> Result<()> {
    let env = TestEnv::new()?;
    let output = env.run(&["resolve", "http://mirror.example.com/fedora/os/"])?;
    output.assert_success("resolve http");
    assert_eq!(
        output.stdout.trim(),
        "network-url\thttp://mirror.example.com/fedora/os/"
    );
    Ok(())
}
integration_test!(test_resolve_http_tree);

fn test_resolve_nfs_on_remote_connection() -> Result<()> {
    let env = TestEnv::new()?;
    // The remote daemon performs the mount, so no local privilege is needed
    let output = env.run(&[
        "resolve",
        "nfs://nfs.example.com/exports/os",
        "--connect",
        "qemu+ssh://virt.example.com/system",
        "--json",
    ])?;
    output.assert_success("resolve nfs");
    let json = output.json()?;
    assert_eq!(json["location"], "nfs:nfs.example.com:/exports/os");
    assert_eq!(json["kind"], "network-url");
    Ok(())
}
integration_test!(test_resolve_nfs_on_remote_connection);

fn test_resolve_nfs_without_path() -> Result<()> {
    let env = TestEnv::new()?;
    let output = env.run(&[
        "resolve",
        "nfs://nfs.example.com",
        "--connect",
        "qemu+ssh://virt.example.com/system",
    ])?;
    output.assert_failure("resolve nfs without path", "Invalid NFS format");
    Ok(())
}
integration_test!(test_resolve_nfs_without_path);

fn test_resolve_missing_path() -> Result<()> {
    let env = TestEnv::new()?;
    let missing = env.dir.join("does-not-exist.iso");
    let output = env.run(&["resolve", missing.as_str()])?;
    output.assert_failure(
        "resolve missing path",
        "Checking installer location failed",
    );
    Ok(())
}
integration_test!(test_resolve_missing_path);

fn test_resolve_pool_volume_needs_storage() -> Result<()> {
    // The test configuration never lets the connection manage storage
    let env = TestEnv::new()?;
    let output = env.run(&[
        "resolve",
        "vinst-missing-volume.iso",
        "--pool",
        "vinst-missing-pool",
    ])?;
    output.assert_failure(
        "resolve pool volume",
        "A storage-capable connection is required if 'location' is a storage tuple.",
    );
    Ok(())
}
integration_test!(test_resolve_pool_volume_needs_storage);
