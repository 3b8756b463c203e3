//! Loopback round against the framed RPC service.

use std::net::TcpListener;
use std::thread;

use dpir::lhe::num_limbs;
use dpir::service::{InitRequest, PirService, ServiceClient};
use dpir::{LweParams, Matrix, Mode, Prg, PrgKey, SimpleServer};

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

#[test]
fn test_loopback_query_round() {
    let rows = 64u64;
    let cols = 64u64;
    let bits_per = 8u64;
    let p_mod = 256u64;

    let mut prg = Prg::from_key(&KEY);
    let limbs = num_limbs(bits_per);
    let data: Vec<u32> = (0..rows * limbs * cols).map(|_| prg.next_u32() % 256).collect();

    let params = LweParams::new::<u32>(cols, p_mod);
    let server =
        SimpleServer::<u32>::new(&data, bits_per, params, KEY, Mode::Hybrid, false).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let _ = PirService::new(server).serve(listener);
    });

    let init = InitRequest { rows, cols, p_mod, bits_per, batch_size: 2 };
    let mut client = ServiceClient::<u32>::connect(addr, init).unwrap();
    let info = *client.db_info();

    // Query two records
    let indices = [5u64, 777];
    let inputs: Vec<Matrix<u32>> = indices
        .iter()
        .map(|&idx| {
            let mut input = Matrix::zeros(info.m, 1);
            input.set(idx % info.m, 0, 1);
            input
        })
        .collect();

    let mut secrets = client.query(&inputs).unwrap();
    let results = client.answer(&mut secrets).unwrap();
    assert_eq!(results.len(), indices.len());

    for (idx, result) in indices.iter().zip(results.iter()) {
        let start = (info.ne * (idx / info.m)) as usize;
        let vals: Vec<u32> = result.data()[start..start + info.ne as usize].to_vec();
        assert_eq!(info.reconstruct_elem(&vals), vec![data[*idx as usize]]);
    }

    // Amortization quotient
    assert_eq!(client.batch_capacity(1000.0, 50.0).unwrap(), 20);
}
