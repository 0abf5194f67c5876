pub mod projectile {
    tonic::include_proto!("projectile");
}

pub mod objectstore {
    tonic::include_proto!("objectstore");
}
