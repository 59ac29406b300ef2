fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server stubs are generated too so the client can be tested in-process
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/hardware.proto"], &["proto"])?;

    Ok(())
}
