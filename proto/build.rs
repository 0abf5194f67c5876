fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::compile_protos("./proto/projectile/projectile.proto")?;
    tonic_build::compile_protos("./proto/objectstore/objectstore.proto")?;
    Ok(())
}