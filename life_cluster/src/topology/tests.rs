// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use super::*;

fn shape(workers: usize) -> (usize, usize) {
    let topology = Topology::plan(workers).expect("Failed to plan");
    assert_eq!(topology.rows() * topology.cols(), workers);
    (topology.rows(), topology.cols())
}

#[test]
fn planned_shapes() {
    // (rows, cols)
    assert_eq!(shape(1), (1, 1));
    assert_eq!(shape(2), (2, 1));
    assert_eq!(shape(4), (2, 2));
    assert_eq!(shape(6), (3, 2));
    assert_eq!(shape(8), (4, 2));
    assert_eq!(shape(9), (3, 3));
    assert_eq!(shape(12), (6, 2));
}

#[test]
fn primes_are_a_single_column() {
    for p in [3, 5, 7, 11, 13] {
        assert_eq!(shape(p), (p, 1));
    }
}

#[test]
fn zero_workers_is_an_error() {
    assert_eq!(Topology::plan(0), Err(TopologyError::NoWorkers));
}

#[test]
fn single_worker_is_its_own_neighbour() {
    let topology = Topology::plan(1).expect("Failed to plan");
    for direction in Direction::ALL {
        assert_eq!(topology.neighbour(0, direction), Some(0));
    }
}

#[test]
fn neighbours_wrap_around() {
    // 2x2
    let topology = Topology::plan(4).expect("Failed to plan");
    assert_eq!(topology.position(3), Some((1, 1)));
    assert_eq!(topology.neighbour(0, Direction::North), Some(2));
    assert_eq!(topology.neighbour(0, Direction::West), Some(1));
    assert_eq!(topology.neighbour(0, Direction::NorthWest), Some(3));
    assert_eq!(topology.neighbour(3, Direction::SouthEast), Some(0));
    assert_eq!(topology.neighbour(4, Direction::North), None);

    // 3x2
    let topology = Topology::plan(6).expect("Failed to plan");
    let table = topology.neighbour_table(0);
    let expected = [
        (Direction::North, Some(4)),
        (Direction::NorthEast, Some(5)),
        (Direction::East, Some(1)),
        (Direction::SouthEast, Some(3)),
        (Direction::South, Some(2)),
        (Direction::SouthWest, Some(3)),
        (Direction::West, Some(1)),
        (Direction::NorthWest, Some(5)),
    ];
    assert_eq!(table, expected);
}

#[test]
fn neighbourhood_is_symmetric() {
    for workers in [1, 2, 4, 6, 9, 12] {
        let topology = Topology::plan(workers).expect("Failed to plan");
        for id in 0..workers {
            for direction in Direction::ALL {
                let other = topology.neighbour(id, direction).expect("Missing neighbour");
                assert_eq!(topology.neighbour(other, direction.inverse()), Some(id));
            }
        }
    }
}

#[test]
fn direction_tokens() {
    for direction in Direction::ALL {
        assert_eq!(direction.as_str().parse::<Direction>(), Ok(direction));
        assert_eq!(direction.inverse().inverse(), direction);
        let (r, c) = direction.offset();
        assert_eq!(direction.inverse().offset(), (-r, -c));
    }
    assert_eq!("northEast".parse::<Direction>(), Ok(Direction::NorthEast));
    assert!("UP".parse::<Direction>().is_err());
    assert!(Direction::SouthWest.is_diagonal());
    assert!(!Direction::West.is_diagonal());
    assert_eq!(Direction::NorthWest.index(), 7);
}
