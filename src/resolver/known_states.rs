//! Win states per horizon for small models, `(board_size, max_exponent, states)`.

/// Complete tables: the horizon after the last state is exhausted.
pub(crate) const WIN_STATE_TABLES: &[(usize, u8, &[&[u8]])] = &[
    (2, 2, &[&[0, 0, 0, 2], &[0, 0, 1, 1], &[0, 1, 1, 0]]),
    (2, 3, &[&[0, 0, 0, 3], &[0, 0, 2, 2], &[0, 1, 2, 1], &[0, 1, 1, 2]]),
    (2, 4, &[&[0, 0, 0, 4], &[0, 0, 3, 3], &[0, 2, 3, 2], &[0, 2, 2, 3]]),
    (2, 5, &[&[0, 0, 0, 5], &[0, 0, 4, 4], &[0, 3, 4, 3], &[0, 3, 3, 4]]),
    (2, 6, &[&[0, 0, 0, 6], &[0, 0, 5, 5], &[0, 4, 5, 4], &[0, 4, 4, 5]]),
    (
        3,
        2,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 2],
            &[0, 0, 0, 0, 0, 0, 0, 1, 1],
            &[0, 0, 0, 0, 0, 1, 0, 1, 0],
        ],
    ),
    (
        3,
        3,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 3],
            &[0, 0, 0, 0, 0, 0, 0, 2, 2],
            &[0, 0, 0, 0, 0, 0, 1, 1, 2],
            &[0, 0, 0, 0, 0, 1, 2, 1, 0],
        ],
    ),
    (
        4,
        2,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 0],
        ],
    ),
    (
        4,
        3,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 2],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 2],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 2, 1, 0],
        ],
    ),
    (
        4,
        4,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 3],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 3],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 2, 3],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 3, 2, 1, 0],
        ],
    ),
    (
        4,
        5,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4, 4],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 3, 4],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 3, 4],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 4, 3, 2, 1],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 4, 3, 2, 1],
        ],
    ),
];

/// Longer 3x3 tables. The first `max_exponent` entries are the run states
/// `WinStates` builds; a further entry is another state that wins in exactly
/// that many moves.
pub(crate) const LONG_3X3_TABLES: &[(u8, &[&[u8]])] = &[
    (
        4,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 4],
            &[0, 0, 0, 0, 0, 0, 0, 3, 3],
            &[0, 0, 0, 0, 0, 0, 2, 2, 3],
            &[0, 0, 0, 0, 0, 1, 3, 2, 1],
        ],
    ),
    (
        5,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 5],
            &[0, 0, 0, 0, 0, 0, 0, 4, 4],
            &[0, 0, 0, 0, 0, 0, 3, 3, 4],
            &[0, 0, 0, 0, 0, 2, 4, 3, 2],
            &[0, 0, 0, 0, 1, 1, 4, 3, 2],
            &[0, 0, 1, 0, 1, 0, 4, 3, 2],
        ],
    ),
    (
        6,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 6],
            &[0, 0, 0, 0, 0, 0, 0, 5, 5],
            &[0, 0, 0, 0, 0, 0, 4, 4, 5],
            &[0, 0, 0, 0, 0, 3, 5, 4, 3],
            &[0, 0, 0, 0, 2, 2, 5, 4, 3],
            &[0, 0, 0, 1, 1, 2, 5, 4, 3],
            &[0, 1, 0, 1, 0, 2, 5, 4, 3],
        ],
    ),
    (
        7,
        &[
            &[0, 0, 0, 0, 0, 0, 0, 0, 7],
            &[0, 0, 0, 0, 0, 0, 0, 6, 6],
            &[0, 0, 0, 0, 0, 0, 5, 5, 6],
            &[0, 0, 0, 0, 0, 4, 6, 5, 4],
            &[0, 0, 0, 0, 3, 3, 6, 5, 4],
            &[0, 0, 0, 2, 2, 3, 6, 5, 4],
            &[0, 0, 1, 3, 2, 1, 4, 5, 6],
        ],
    ),
];
