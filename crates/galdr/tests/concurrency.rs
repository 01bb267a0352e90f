use galdr::{Reflect, Result, Serializer};
use std::sync::Arc;
use std::thread;

#[derive(Reflect, Default, Debug, PartialEq, Clone)]
pub struct Frame {
    pub index: u64,
    pub payload: Vec<u8>,
    pub source: String,
}

#[derive(Reflect, Default, Debug, PartialEq, Clone)]
pub struct Batch {
    pub frames: Vec<Frame>,
    pub checksum: u32,
}

fn sample_batch(seed: u64) -> Batch {
    Batch {
        frames: (0..8)
            .map(|index| Frame {
                index: seed * 100 + index,
                payload: vec![seed as u8; index as usize],
                source: format!("camera-{seed}"),
            })
            .collect(),
        checksum: seed as u32,
    }
}

/// Many threads hammer one shared serializer on a type none of them has
/// seen before; every thread must produce identical bytes and decode its
/// peers' output.
#[test]
fn test_shared_serializer_fan_out() -> Result<()> {
    let serializer = Arc::new(Serializer::new());
    let batch = sample_batch(3);

    let mut reference: Vec<u8> = Vec::new();
    Serializer::new().encode(&batch, &mut reference)?;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let serializer = Arc::clone(&serializer);
            let batch = batch.clone();
            thread::spawn(move || -> Result<Vec<u8>> {
                let mut encoded: Vec<u8> = Vec::new();
                serializer.encode(&batch, &mut encoded)?;
                let decoded: Batch = serializer.decode(encoded.as_slice())?;
                assert_eq!(decoded, batch);
                Ok(encoded)
            })
        })
        .collect();

    for handle in handles {
        let encoded = handle.join().expect("encoder thread panicked")?;
        assert_eq!(encoded, reference);
    }

    Ok(())
}

/// Concurrent decoding of distinct values through one shared serializer.
#[test]
fn test_shared_serializer_concurrent_decode() -> Result<()> {
    let serializer = Arc::new(Serializer::new());

    let encoded: Vec<Vec<u8>> = (0..8)
        .map(|seed| {
            let mut bytes: Vec<u8> = Vec::new();
            serializer.encode(&sample_batch(seed), &mut bytes)?;
            Ok(bytes)
        })
        .collect::<Result<_>>()?;

    let handles: Vec<_> = encoded
        .into_iter()
        .enumerate()
        .map(|(seed, bytes)| {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || -> Result<()> {
                for _ in 0..32 {
                    let decoded: Batch = serializer.decode(bytes.as_slice())?;
                    assert_eq!(decoded, sample_batch(seed as u64));
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("decoder thread panicked")?;
    }

    Ok(())
}
