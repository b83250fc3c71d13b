// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use super::*;
use crate::pattern::parse_pattern;

fn grid(text: &str) -> Grid {
    parse_pattern(text, 'x').expect("Failed to parse grid")
}

#[test]
fn lone_cell_dies() {
    let next = next_state(&grid("...\n.x.\n..."));
    assert!(next.live_cells().is_empty());
}

#[test]
fn survival_and_birth() {
    // the centre has 2 live neighbours and survives, the cells above and below it
    // see 3 and are born
    let blinker = grid("...\nxxx\n...");
    let next = next_state(&blinker);
    assert_eq!(next.live_cells(), vec![(0, 1), (1, 1), (2, 1)]);
    assert_eq!(next_state(&next), blinker);
}

#[test]
fn overcrowded_cell_dies() {
    let next = next_state(&grid("xxx\nxxx\n..."));
    assert!(!next.get(0, 1).map(|c| c.alive).unwrap_or(true));
    assert!(!next.get(1, 1).map(|c| c.alive).unwrap_or(true));
}

#[test]
fn block_is_stable() {
    let block = grid("....\n.xx.\n.xx.\n....");
    let next = next_state(&block);
    assert!(next.is_identical(&block));
    assert_eq!(next, block);
}

#[test]
fn neighbours_stop_at_the_edge() {
    let g = grid("x.x\n...\nx.x");
    assert_eq!(count_live_neighbours(&g, 1, 1), 4);
    assert_eq!(count_live_neighbours(&g, 0, 0), 0);
    assert_eq!(count_live_neighbours(&g, 0, 1), 2);
}

#[test]
fn next_state_keeps_coordinates() {
    let cells = vec![
        Cell::new(40, 7, true),
        Cell::new(40, 8, false),
        Cell::new(41, 7, false),
        Cell::new(41, 8, true),
    ];
    let g = Grid::from_cells(2, 2, cells).expect("Failed to build grid");
    let next = next_state(&g);
    let coords: Vec<(usize, usize)> = next.cells().map(|c| (c.row, c.col)).collect();
    assert_eq!(coords, vec![(40, 7), (40, 8), (41, 7), (41, 8)]);
}

#[test]
fn identical_ignores_coordinates() {
    let a = Grid::from_cells(1, 1, vec![Cell::new(0, 0, true)]).expect("Failed to build grid");
    let b = Grid::from_cells(1, 1, vec![Cell::new(5, 5, true)]).expect("Failed to build grid");
    let c = Grid::dead(1, 1).expect("Failed to build grid");
    assert!(a.is_identical(&b));
    assert!(!a.is_identical(&c));
    let wider = Grid::dead(1, 2).expect("Failed to build grid");
    assert!(!a.is_identical(&wider));
}

#[test]
fn constructors_reject_bad_shapes() {
    assert_eq!(Grid::dead(0, 3), Err(GridError::Empty));
    assert_eq!(
        Grid::from_cells(2, 2, vec![Cell::new(0, 0, false)]),
        Err(GridError::CellCount {
            expected: 4,
            got: 1,
        })
    );
    assert_eq!(
        Grid::from_placements(1, 2, [((0, 0), Cell::new(0, 0, true))]),
        Err(GridError::MissingCell { row: 0, col: 1 })
    );
}

#[test]
fn embed_centres_the_pattern() {
    let topology = Topology::plan(1).expect("Failed to plan");
    let glider = grid(".x.\n..x\nxxx");
    let board = embed_pattern(&topology, 10, &glider).expect("Failed to embed");
    assert_eq!((board.rows(), board.cols()), (10, 10));
    assert_eq!(
        board.live_cells(),
        vec![(4, 5), (5, 6), (6, 4), (6, 5), (6, 6)]
    );
    // every cell knows where it is
    assert!(board
        .cells()
        .enumerate()
        .all(|(idx, c)| (c.row, c.col) == (idx / 10, idx % 10)));
}

#[test]
fn embed_truncates_large_patterns() {
    let topology = Topology::plan(1).expect("Failed to plan");
    let pattern = grid("xxxx\nxxxx\nxxxx\nxxxx");
    let board = embed_pattern(&topology, 2, &pattern).expect("Failed to embed");
    assert_eq!((board.rows(), board.cols()), (2, 2));
    assert_eq!(board.live_cells().len(), 4);

    assert_eq!(
        embed_pattern(&topology, 0, &pattern),
        Err(GridError::ZeroBlockSize)
    );
}

#[test]
fn tiles_partition_the_board() {
    let topology = Topology::plan(6).expect("Failed to plan");
    let board = Grid::dead(topology.rows() * 4, topology.cols() * 4)
        .expect("Failed to build grid");

    let mut seen = std::collections::HashSet::new();
    for id in 0..topology.workers() {
        let tile = board.tile(&topology, id).expect("Failed to cut tile");
        assert_eq!((tile.rows(), tile.cols()), (4, 4));
        for cell in tile.cells() {
            let first = seen.insert((cell.row, cell.col));
            assert!(first, "{cell:?} is in two tiles");
        }
    }
    assert_eq!(seen.len(), board.rows() * board.cols());

    // worker 3 sits at row 1, col 1 of a 3x2 layout
    let tile = board.tile(&topology, 3).expect("Failed to cut tile");
    assert_eq!(tile.get(0, 0), Some(&Cell::new(4, 4, false)));
    assert!(board.tile(&topology, 6).is_err());
}
