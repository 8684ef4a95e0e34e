use ndrt_io::{load, load_on, save, IoError};
use ndrt_tensor::{Device, Tensor};

#[test]
fn save_load_file() -> Result<(), IoError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp_dir = tempfile::tempdir()?;
    let file_path = tmp_dir.path().join("weights.ndrt");

    let t = Tensor::arange(0.0, 6.0, 1.0, Device::Cpu)?.reshape(&[2, 3])?;
    save(&t, &file_path)?;
    assert!(file_path.exists());

    let back = load(&file_path)?;
    assert_eq!(back.shape(), &[2, 3]);
    assert_eq!(back.device(), Device::Cpu);
    assert_eq!(back.to_vec()?, t.to_vec()?);
    assert!(!back.shares_buffer(&t));

    let on_cpu = load_on(&file_path, Device::Cpu)?;
    assert_eq!(on_cpu.get(&[1, 2])?, 5.0);
    Ok(())
}

#[test]
fn load_missing_file() -> Result<(), IoError> {
    let tmp_dir = tempfile::tempdir()?;
    let file_path = tmp_dir.path().join("missing.ndrt");
    assert!(matches!(load(&file_path), Err(IoError::FileDoesNotExist(_))));
    Ok(())
}

#[test]
fn load_foreign_file() -> Result<(), IoError> {
    let tmp_dir = tempfile::tempdir()?;
    let file_path = tmp_dir.path().join("foreign.bin");
    std::fs::write(&file_path, b"PK\x03\x04 not a tensor")?;
    assert!(matches!(load(&file_path), Err(IoError::InvalidMagic(_))));
    Ok(())
}

#[cfg(not(feature = "cuda"))]
#[test]
fn load_on_unavailable_gpu() -> Result<(), IoError> {
    let tmp_dir = tempfile::tempdir()?;
    let file_path = tmp_dir.path().join("t.ndrt");
    save(&Tensor::ones(&[2], Device::Cpu)?, &file_path)?;
    assert!(matches!(
        load_on(&file_path, Device::gpu(0)),
        Err(IoError::Tensor(ndrt_tensor::TensorError::DeviceUnavailable { .. }))
    ));
    Ok(())
}
