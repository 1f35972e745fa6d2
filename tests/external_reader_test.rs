use candle_core::{Device, Tensor};
use tempfile::tempdir;
use weights_converter::{write_container, Compression, Dims, StateDict};

fn 샘플_체크포인트() -> (Dims, StateDict) {
    let dev = Device::Cpu;
    let dims: Dims = [("n_vocab".to_string(), 51864), ("n_layer".to_string(), 4)]
        .into_iter()
        .collect();

    let mut weights = StateDict::new();
    weights.insert(
        "encoder.conv1.weight".to_string(),
        Tensor::arange(0f32, 60.0, &dev).unwrap().reshape((3, 4, 5)).unwrap(),
    );
    weights.insert(
        "decoder.ln.weight".to_string(),
        Tensor::arange(0f32, 16.0, &dev).unwrap(),
    );
    weights.insert(
        "decoder.blocks.0.attn.query.weight".to_string(),
        Tensor::arange(0f32, 1200.0, &dev).unwrap().reshape((30, 40)).unwrap(),
    );
    weights.insert(
        "decoder.ln.bias".to_string(),
        Tensor::new(0.25f32, &dev).unwrap(),
    );
    (dims, weights)
}

#[test]
fn test_output_readable_by_independent_hdf5_reader() {
    println!("=== 독립 HDF5 reader 호환성 ===");
    let dir = tempdir().unwrap();

    for (tag, compression) in [("none", Compression::None), ("gzip", Compression::gzip())] {
        let (dims, weights) = 샘플_체크포인트();
        let path = dir.path().join(format!("{tag}.h5"));
        write_container(&path, &dims, &weights, compression).unwrap();

        let file = hdf5_reader::Hdf5File::open(&path).unwrap();
        let (groups, datasets) = file.root_group().unwrap().members().unwrap();
        let mut names: Vec<String> = groups.iter().map(|g| g.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["dims", "model_state_dict"]);
        assert!(datasets.is_empty());

        for (name, &value) in &dims {
            let ds = file.dataset(&format!("dims/{name}")).unwrap();
            assert!(ds.shape().is_empty());
            let values: Vec<i32> = ds.read_array::<i32>().unwrap().iter().copied().collect();
            assert_eq!(values, vec![value as i32]);
        }

        for (name, tensor) in &weights {
            let ds = file.dataset(&format!("model_state_dict/{name}")).unwrap();
            let shape: Vec<usize> = ds.shape().iter().map(|&d| d as usize).collect();
            assert_eq!(shape, tensor.dims());

            let stored: Vec<f32> = ds.read_array::<f32>().unwrap().iter().copied().collect();
            let expected = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            assert_eq!(stored, expected);
        }
        println!("{tag}: {} dims, {} weights 확인", dims.len(), weights.len());
    }
}
