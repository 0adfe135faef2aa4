use crate::{storage::EncodingDatabase, Embedding};
use facegate_vision::{compare_faces, MATCH_THRESHOLD};

/// Number of enrolled encodings of `name` that matched a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchVote<'a> {
    pub name: &'a str,
    pub count: usize,
}

/// Tallies matching encodings per name, in first-encountered order.
pub fn tally<'a>(db: &'a EncodingDatabase, probe: &Embedding) -> Vec<MatchVote<'a>> {
    let matches = compare_faces(db.encodings(), probe, MATCH_THRESHOLD);

    let mut votes: Vec<MatchVote<'a>> = Vec::new();
    for (name, _) in db.names().iter().zip(matches).filter(|(_, hit)| *hit) {
        let name = name.as_str();
        match votes.iter_mut().find(|v| v.name == name) {
            Some(vote) => vote.count += 1,
            None => votes.push(MatchVote { name, count: 1 }),
        }
    }
    votes
}

/// Name with the most matching encodings. Ties go to the name that appears
/// first in the database; `None` when nothing matches.
pub fn identify<'a>(db: &'a EncodingDatabase, probe: &Embedding) -> Option<&'a str> {
    tally(db, probe)
        .into_iter()
        .fold(None, |best: Option<MatchVote<'a>>, vote| match best {
            Some(b) if b.count >= vote.count => Some(b),
            _ => Some(vote),
        })
        .map(|vote| vote.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn unit(v: &[f32]) -> Embedding {
        Embedding::normalized(v.to_vec())
    }

    fn db(entries: &[(&str, &[f32])]) -> EncodingDatabase {
        let mut db = EncodingDatabase::new();
        for (name, v) in entries {
            db.push(*name, unit(v));
        }
        db
    }

    #[test]
    fn single_matching_identity_wins() {
        let db = db(&[
            ("alice", &[1.0, 0.0, 0.0]),
            ("bob", &[0.0, 1.0, 0.0]),
            ("bob", &[0.0, 0.0, 1.0]),
        ]);
        assert_eq!(identify(&db, &unit(&[0.9, 0.1, 0.0])), Some("alice"));
    }

    #[test]
    fn no_match_is_none() {
        let db = db(&[("alice", &[1.0, 0.0]), ("bob", &[0.0, 1.0])]);
        assert_eq!(identify(&db, &unit(&[-1.0, -1.0])), None);
        assert!(tally(&db, &unit(&[-1.0, -1.0])).is_empty());
        assert_eq!(identify(&EncodingDatabase::new(), &unit(&[1.0, 0.0])), None);
    }

    #[test]
    fn majority_beats_earlier_single_vote() {
        let db = db(&[
            ("alice", &[1.0, 0.2]),
            ("bob", &[1.0, 0.0]),
            ("bob", &[1.0, 0.1]),
        ]);
        let probe = unit(&[1.0, 0.05]);
        assert_eq!(
            tally(&db, &probe),
            vec![
                MatchVote { name: "alice", count: 1 },
                MatchVote { name: "bob", count: 2 },
            ]
        );
        assert_eq!(identify(&db, &probe), Some("bob"));
    }

    #[test]
    fn tie_goes_to_first_encountered() {
        let probe = unit(&[1.0, 0.0]);
        let db_carol_first = db(&[
            ("carol", &[1.0, 0.0]),
            ("alice", &[1.0, 0.1]),
            ("alice", &[0.0, 1.0]),
            ("carol", &[0.0, -1.0]),
        ]);
        assert_eq!(identify(&db_carol_first, &probe), Some("carol"));

        let db_alice_first = db(&[
            ("alice", &[1.0, 0.1]),
            ("carol", &[1.0, 0.0]),
        ]);
        assert_eq!(identify(&db_alice_first, &probe), Some("alice"));
    }

    #[test]
    fn repeated_calls_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut db = EncodingDatabase::new();
        for i in 0..64 {
            let v: Vec<f32> = (0..128).map(|_| rng.gen_range(-1.0..1.0)).collect();
            db.push(format!("person{}", i % 5), Embedding::normalized(v));
        }
        let probe = db.encodings()[17].clone();

        let first = identify(&db, &probe);
        assert!(first.is_some());
        assert!(tally(&db, &probe).iter().any(|v| v.name == "person2"));
        for _ in 0..10 {
            assert_eq!(identify(&db, &probe), first);
        }
    }
}
