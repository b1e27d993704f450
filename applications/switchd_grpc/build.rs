fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().build_client(true).build_server(true).compile(
        &[
            "proto/gnmi.proto",
            "proto/gnoi_os.proto",
            "proto/gnoi_system.proto",
            "proto/gnsi_certz.proto",
            "proto/gnsi_credentialz.proto",
            "proto/containerz.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}
