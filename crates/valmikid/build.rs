fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path().map_err(|e| format!("vendored protoc unavailable: {e:?}"))?;
    std::env::set_var("PROTOC", protoc);
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/valmiki.proto"], &["proto/"])?;
    Ok(())
}
