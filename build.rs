fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(
            "starter.v1.ConversationStarterRequest",
            "#[derive(serde::Serialize, serde::Deserialize)] #[serde(default, rename_all = \"camelCase\")]",
        )
        .type_attribute(
            "starter.v1.ConversationStarterResponse",
            "#[derive(serde::Serialize, serde::Deserialize)] #[serde(default, rename_all = \"camelCase\")]",
        )
        .compile_protos(&["proto/starter.proto"], &["proto"])?;
    Ok(())
}
